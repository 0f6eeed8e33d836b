use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::http_client::http_client;

/// One fixture as delivered by the feed, already flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureRow {
    pub fixture_id: i64,
    pub date: String,
    pub status: Option<String>,
    pub round: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub stadium: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Pulls the season's fixtures and upserts them keyed on fixture id, all in
/// one transaction: a failing row rolls the whole batch back.
pub fn sync_fixtures(conn: &mut Connection, config: &Config) -> Result<SyncSummary> {
    let body = fetch_fixtures_payload(config)?;
    let (rows, skipped) = parse_fixtures_json(&body)?;
    let fetched = rows.len() + skipped;
    info!(fetched, skipped, league_id = config.league_id, "fixtures fetched");

    let mut existing: HashSet<i64> = HashSet::new();
    {
        let mut stmt = conn
            .prepare("SELECT fixture_id FROM matches WHERE fixture_id IS NOT NULL")
            .context("prepare existing fixture ids query")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .context("query existing fixture ids")?;
        for id in ids {
            existing.insert(id.context("decode fixture id")?);
        }
    }

    let mut summary = SyncSummary {
        fetched,
        skipped,
        ..SyncSummary::default()
    };

    let tx = conn.transaction().context("begin sync transaction")?;
    for row in &rows {
        upsert_fixture(&tx, row, i64::from(config.season))?;
        if existing.contains(&row.fixture_id) {
            summary.updated += 1;
        } else {
            summary.inserted += 1;
        }
    }
    tx.commit().context("commit sync transaction")?;

    Ok(summary)
}

fn upsert_fixture(tx: &rusqlite::Transaction<'_>, row: &FixtureRow, season: i64) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO matches (
            fixture_id, date, home_team, away_team, home_score, away_score,
            status, round, season, stadium, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(fixture_id) DO UPDATE SET
            date = excluded.date,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            home_score = excluded.home_score,
            away_score = excluded.away_score,
            status = excluded.status,
            round = excluded.round,
            season = excluded.season,
            stadium = excluded.stadium,
            updated_at = excluded.updated_at
        "#,
        params![
            row.fixture_id,
            row.date,
            row.home_team,
            row.away_team,
            row.home_goals,
            row.away_goals,
            row.status,
            row.round,
            season,
            row.stadium,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert fixture")?;
    Ok(())
}

fn fetch_fixtures_payload(config: &Config) -> Result<String> {
    let api = config.fixtures_api()?;
    let client = http_client()?;
    let url = format!("https://{}/v3/fixtures", api.host);

    let resp = client
        .get(&url)
        .query(&[
            ("league", config.league_id.to_string()),
            ("season", config.season.to_string()),
        ])
        .header("x-rapidapi-key", &api.key)
        .header("x-rapidapi-host", &api.host)
        .send()
        .context("fixtures request failed")?;

    let status = resp.status();
    let body = resp.text().context("failed reading fixtures body")?;
    if !status.is_success() {
        return Err(anyhow!("fixtures http {}: {}", status, body));
    }
    Ok(body)
}

/// Flattens the feed's `response` array. Rows that lack an id or team names,
/// or that name the same team twice, are skipped with a warning rather than
/// failing the batch; the second value counts them.
pub(crate) fn parse_fixtures_json(body: &str) -> Result<(Vec<FixtureRow>, usize)> {
    let value: Value = serde_json::from_str(body.trim()).context("invalid fixtures json")?;
    let items = value
        .get("response")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing response array in fixtures payload"))?;

    let mut out = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        match parse_fixture(item) {
            Some(row) => out.push(row),
            None => {
                skipped += 1;
                warn!("skipping malformed fixture entry");
            }
        }
    }
    Ok((out, skipped))
}

fn parse_fixture(v: &Value) -> Option<FixtureRow> {
    let fixture = v.get("fixture")?;
    let fixture_id = fixture.get("id")?.as_i64()?;
    let date = fixture.get("date")?.as_str()?.to_string();
    let status = fixture
        .get("status")
        .and_then(|s| s.get("short"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());
    let stadium = fixture
        .get("venue")
        .and_then(|venue| venue.get("name"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let round = v
        .get("league")
        .and_then(|l| l.get("round"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let teams = v.get("teams")?;
    let home_team = teams
        .get("home")
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str)?
        .to_string();
    let away_team = teams
        .get("away")
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str)?
        .to_string();
    if home_team.is_empty() || away_team.is_empty() || home_team == away_team {
        return None;
    }

    let goals = v.get("goals");
    let home_goals = goals
        .and_then(|g| g.get("home"))
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok());
    let away_goals = goals
        .and_then(|g| g.get("away"))
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok());

    Some(FixtureRow {
        fixture_id,
        date,
        status,
        round,
        home_team,
        away_team,
        home_goals,
        away_goals,
        stadium,
    })
}

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

/// One row of the `matches` table. `fixture_id` is the external feed identity
/// when the row came from a sync; manually seeded rows only have the
/// synthetic primary key.
#[derive(Debug, Clone)]
pub struct Match {
    pub id: i64,
    pub fixture_id: Option<i64>,
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: Option<String>,
    pub round: Option<String>,
    pub season: i64,
    pub stadium: Option<String>,
}

impl Match {
    pub fn is_played(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }
}

/// A match described from one team's perspective, used by the form window.
#[derive(Debug, Clone, Copy)]
pub struct TeamResult {
    pub goals_for: i64,
    pub goals_against: i64,
}

/// A completed meeting between two specific teams, raw orientation preserved.
#[derive(Debug, Clone)]
pub struct Meeting {
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: i64,
    pub away_score: i64,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA busy_timeout = 5000;
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id INTEGER UNIQUE,
            date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_score INTEGER NULL,
            away_score INTEGER NULL,
            status TEXT NULL,
            round TEXT NULL,
            season INTEGER NOT NULL,
            stadium TEXT NULL,
            updated_at TEXT NOT NULL,
            CHECK (home_team <> away_team)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(date);
        CREATE INDEX IF NOT EXISTS idx_matches_teams ON matches(home_team, away_team);

        CREATE TABLE IF NOT EXISTS team_form (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team TEXT NOT NULL,
            date TEXT NOT NULL,
            form REAL NOT NULL,
            last_5_matches TEXT NOT NULL,
            goals_scored INTEGER NOT NULL DEFAULT 0,
            goals_conceded INTEGER NOT NULL DEFAULT 0,
            UNIQUE(team, date)
        );
        CREATE INDEX IF NOT EXISTS idx_team_form_team_date ON team_form(team, date);

        CREATE TABLE IF NOT EXISTS head_to_head_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team1 TEXT NOT NULL,
            team2 TEXT NOT NULL,
            last_5_matches TEXT NOT NULL,
            team1_goals_avg REAL NOT NULL,
            team2_goals_avg REAL NOT NULL,
            team1_wins INTEGER NOT NULL,
            team2_wins INTEGER NOT NULL,
            draws INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(team1, team2)
        );

        CREATE TABLE IF NOT EXISTS player_availability (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_name TEXT NOT NULL,
            team TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT NULL,
            start_date TEXT NOT NULL,
            expected_return_date TEXT NULL,
            impact_level INTEGER NOT NULL DEFAULT 3,
            is_key_player INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_player_availability_team ON player_availability(team);
        CREATE INDEX IF NOT EXISTS idx_player_availability_dates
            ON player_availability(start_date, expected_return_date);

        CREATE TABLE IF NOT EXISTS stadium_conditions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stadium TEXT NOT NULL,
            match_date TEXT NOT NULL,
            temperature REAL NOT NULL,
            precipitation REAL NOT NULL,
            wind_speed REAL NOT NULL,
            weather_condition TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            UNIQUE(stadium, match_date)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Fields for a manually inserted match (tests, maintenance scripts). Synced
/// rows go through `sync::sync_fixtures` instead.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub round: Option<String>,
    pub season: i64,
    pub stadium: Option<String>,
}

pub fn insert_match(conn: &Connection, m: &NewMatch) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO matches (date, home_team, away_team, home_score, away_score,
                             status, round, season, stadium, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9)
        "#,
        params![
            m.date,
            m.home_team,
            m.away_team,
            m.home_score,
            m.away_score,
            m.round,
            m.season,
            m.stadium,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("insert match")?;
    Ok(conn.last_insert_rowid())
}

/// Completed matches involving `team` strictly before `before`, most recent
/// first, projected onto the team's perspective.
pub fn recent_results_for_team(
    conn: &Connection,
    team: &str,
    before: &str,
    limit: usize,
) -> Result<Vec<TeamResult>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                CASE WHEN home_team = ?1 THEN home_score ELSE away_score END,
                CASE WHEN home_team = ?1 THEN away_score ELSE home_score END
            FROM matches
            WHERE (home_team = ?1 OR away_team = ?1)
              AND date < ?2
              AND home_score IS NOT NULL
              AND away_score IS NOT NULL
            ORDER BY date DESC, id DESC
            LIMIT ?3
            "#,
        )
        .context("prepare recent results query")?;

    let rows = stmt
        .query_map(params![team, before, limit as i64], |row| {
            Ok(TeamResult {
                goals_for: row.get(0)?,
                goals_against: row.get(1)?,
            })
        })
        .context("query recent results")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode recent result row")?);
    }
    Ok(out)
}

/// Completed meetings between the two teams (either orientation), most recent
/// first, restricted to `date <= cutoff`.
pub fn meetings_between(
    conn: &Connection,
    team_a: &str,
    team_b: &str,
    cutoff: &str,
    limit: usize,
) -> Result<Vec<Meeting>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT date, home_team, away_team, home_score, away_score
            FROM matches
            WHERE ((home_team = ?1 AND away_team = ?2)
                OR (home_team = ?2 AND away_team = ?1))
              AND date <= ?3
              AND home_score IS NOT NULL
              AND away_score IS NOT NULL
            ORDER BY date DESC, id DESC
            LIMIT ?4
            "#,
        )
        .context("prepare meetings query")?;

    let rows = stmt
        .query_map(params![team_a, team_b, cutoff, limit as i64], |row| {
            Ok(Meeting {
                date: row.get(0)?,
                home_team: row.get(1)?,
                away_team: row.get(2)?,
                home_score: row.get(3)?,
                away_score: row.get(4)?,
            })
        })
        .context("query meetings")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode meeting row")?);
    }
    Ok(out)
}

/// All completed matches, oldest first. Used by the bulk form refresh.
pub fn load_played_matches(conn: &Connection) -> Result<Vec<Match>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, fixture_id, date, home_team, away_team, home_score, away_score,
                   status, round, season, stadium
            FROM matches
            WHERE home_score IS NOT NULL AND away_score IS NOT NULL
            ORDER BY date ASC, id ASC
            "#,
        )
        .context("prepare played matches query")?;
    collect_matches(stmt.query_map([], decode_match).context("query played matches")?)
}

/// Matches without a result dated on or after `from`, soonest first.
pub fn upcoming_matches(conn: &Connection, from: &str) -> Result<Vec<Match>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, fixture_id, date, home_team, away_team, home_score, away_score,
                   status, round, season, stadium
            FROM matches
            WHERE home_score IS NULL AND away_score IS NULL
              AND date >= ?1
            ORDER BY date ASC, id ASC
            "#,
        )
        .context("prepare upcoming matches query")?;
    collect_matches(stmt.query_map(params![from], decode_match).context("query upcoming matches")?)
}

pub fn match_by_id(conn: &Connection, id: i64) -> Result<Option<Match>> {
    conn.query_row(
        r#"
        SELECT id, fixture_id, date, home_team, away_team, home_score, away_score,
               status, round, season, stadium
        FROM matches
        WHERE id = ?1
        "#,
        params![id],
        decode_match,
    )
    .optional()
    .context("query match by id")
}

pub fn distinct_teams(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT home_team FROM matches
             UNION SELECT DISTINCT away_team FROM matches
             ORDER BY 1",
        )
        .context("prepare distinct teams query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query distinct teams")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode team name")?);
    }
    Ok(out)
}

/// Matches involving `team` in the window `[from, before)`. Drives the
/// fatigue index.
pub fn count_matches_in_window(
    conn: &Connection,
    team: &str,
    from: &str,
    before: &str,
) -> Result<i64> {
    conn.query_row(
        r#"
        SELECT COUNT(*)
        FROM matches
        WHERE (home_team = ?1 OR away_team = ?1)
          AND date >= ?2 AND date < ?3
          AND home_score IS NOT NULL
          AND away_score IS NOT NULL
        "#,
        params![team, from, before],
        |row| row.get(0),
    )
    .context("count matches in window")
}

/// Explicit maintenance only; nothing else deletes from `matches`.
pub fn delete_matches_before(conn: &Connection, cutoff: &str) -> Result<usize> {
    conn.execute("DELETE FROM matches WHERE date < ?1", params![cutoff])
        .context("delete old matches")
}

fn decode_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        fixture_id: row.get(1)?,
        date: row.get(2)?,
        home_team: row.get(3)?,
        away_team: row.get(4)?,
        home_score: row.get(5)?,
        away_score: row.get(6)?,
        status: row.get(7)?,
        round: row.get(8)?,
        season: row.get(9)?,
        stadium: row.get(10)?,
    })
}

fn collect_matches<'a>(
    rows: impl Iterator<Item = rusqlite::Result<Match>> + 'a,
) -> Result<Vec<Match>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode match row")?);
    }
    Ok(out)
}

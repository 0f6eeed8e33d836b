use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::store::{self, TeamResult};

/// Window and decay for the recency-weighted form score. The i-th most recent
/// match gets weight exp(-0.4 * i), normalized over the available set.
pub const FORM_WINDOW: usize = 5;
pub const FORM_DECAY: f64 = 0.4;

pub const FATIGUE_WINDOW_DAYS: i64 = 30;
// A side playing six matches in a month is treated as fully loaded.
const FATIGUE_MATCH_CAP: f64 = 6.0;

/// Recency-weighted form for one team as of one date.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamForm {
    pub team: String,
    pub as_of: String,
    /// In [0, 1]; 1.0 means every counted match was a win.
    pub form: f64,
    /// Points per match, most recent first, values in {0, 1, 3}.
    pub last_5_points: Vec<u8>,
    pub goals_scored: i64,
    pub goals_conceded: i64,
}

impl TeamForm {
    pub fn matches_counted(&self) -> usize {
        self.last_5_points.len()
    }

    pub fn goals_scored_avg(&self) -> f64 {
        per_match_avg(self.goals_scored, self.matches_counted())
    }

    pub fn goals_conceded_avg(&self) -> f64 {
        per_match_avg(self.goals_conceded, self.matches_counted())
    }
}

pub fn points_for(result: &TeamResult) -> u8 {
    if result.goals_for > result.goals_against {
        3
    } else if result.goals_for == result.goals_against {
        1
    } else {
        0
    }
}

/// Pure form core over an already-selected window (most recent first). Empty
/// input yields `None`; the team has no defined form yet.
pub fn form_from_history(results: &[TeamResult]) -> Option<(f64, Vec<u8>, i64, i64)> {
    if results.is_empty() {
        return None;
    }

    let points: Vec<u8> = results.iter().map(points_for).collect();
    let weights: Vec<f64> = (0..results.len())
        .map(|i| (-FORM_DECAY * i as f64).exp())
        .collect();
    let total_weight: f64 = weights.iter().sum();

    let form = points
        .iter()
        .zip(&weights)
        .map(|(p, w)| (f64::from(*p) / 3.0) * (w / total_weight))
        .sum::<f64>();

    let goals_scored = results.iter().map(|r| r.goals_for).sum();
    let goals_conceded = results.iter().map(|r| r.goals_against).sum();
    Some((form, points, goals_scored, goals_conceded))
}

/// Computes form for `team` over the 5 most recent completed matches strictly
/// before `as_of` and upserts the result into `team_form`. Returns `None`
/// without writing when the team has no prior matches.
pub fn compute_form(conn: &Connection, team: &str, as_of: &str) -> Result<Option<TeamForm>> {
    let window = store::recent_results_for_team(conn, team, as_of, FORM_WINDOW)?;
    let Some((form, points, goals_scored, goals_conceded)) = form_from_history(&window) else {
        debug!(team, as_of, "no prior matches; skipping form record");
        return Ok(None);
    };

    let record = TeamForm {
        team: team.to_string(),
        as_of: as_of.to_string(),
        form,
        last_5_points: points,
        goals_scored,
        goals_conceded,
    };
    upsert_team_form(conn, &record)?;
    Ok(Some(record))
}

pub fn upsert_team_form(conn: &Connection, record: &TeamForm) -> Result<()> {
    let sequence = serde_json::to_string(&record.last_5_points)
        .context("encode last-5 points sequence")?;
    conn.execute(
        r#"
        INSERT INTO team_form (team, date, form, last_5_matches, goals_scored, goals_conceded)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(team, date) DO UPDATE SET
            form = excluded.form,
            last_5_matches = excluded.last_5_matches,
            goals_scored = excluded.goals_scored,
            goals_conceded = excluded.goals_conceded
        "#,
        params![
            record.team,
            record.as_of,
            record.form,
            sequence,
            record.goals_scored,
            record.goals_conceded,
        ],
    )
    .context("upsert team form")?;
    Ok(())
}

pub fn stored_form(conn: &Connection, team: &str, as_of: &str) -> Result<Option<TeamForm>> {
    use rusqlite::OptionalExtension;
    let row = conn
        .query_row(
            "SELECT form, last_5_matches, goals_scored, goals_conceded
             FROM team_form WHERE team = ?1 AND date = ?2",
            params![team, as_of],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()
        .context("query stored form")?;

    let Some((form, raw_sequence, goals_scored, goals_conceded)) = row else {
        return Ok(None);
    };
    let last_5_points =
        serde_json::from_str(&raw_sequence).context("decode last-5 points sequence")?;
    Ok(Some(TeamForm {
        team: team.to_string(),
        as_of: as_of.to_string(),
        form,
        last_5_points,
        goals_scored,
        goals_conceded,
    }))
}

#[derive(Debug, Clone, Default)]
pub struct FormRefreshSummary {
    pub matches_walked: usize,
    pub records_written: usize,
}

/// Recomputes every team's form as of each stored match date, replacing the
/// whole `team_form` table content in one transaction. The per-snapshot math
/// runs off an in-memory copy of the match list.
pub fn refresh_team_form(conn: &mut Connection) -> Result<FormRefreshSummary> {
    let matches = store::load_played_matches(conn)?;

    // Oldest-first per-team history; each snapshot reads the slice before its
    // own match date.
    let mut history: HashMap<&str, Vec<(&str, TeamResult)>> = HashMap::new();
    for m in &matches {
        let (Some(home_score), Some(away_score)) = (m.home_score, m.away_score) else {
            continue;
        };
        history.entry(m.home_team.as_str()).or_default().push((
            m.date.as_str(),
            TeamResult {
                goals_for: i64::from(home_score),
                goals_against: i64::from(away_score),
            },
        ));
        history.entry(m.away_team.as_str()).or_default().push((
            m.date.as_str(),
            TeamResult {
                goals_for: i64::from(away_score),
                goals_against: i64::from(home_score),
            },
        ));
    }

    let mut snapshots: Vec<(&str, &str)> = Vec::new();
    for m in &matches {
        snapshots.push((m.home_team.as_str(), m.date.as_str()));
        snapshots.push((m.away_team.as_str(), m.date.as_str()));
    }
    snapshots.sort_unstable();
    snapshots.dedup();

    let records: Vec<TeamForm> = snapshots
        .par_iter()
        .filter_map(|(team, as_of)| {
            let rows = history.get(team)?;
            let window: Vec<TeamResult> = rows
                .iter()
                .rev()
                .filter(|(date, _)| *date < *as_of)
                .take(FORM_WINDOW)
                .map(|(_, r)| *r)
                .collect();
            let (form, points, goals_scored, goals_conceded) = form_from_history(&window)?;
            Some(TeamForm {
                team: (*team).to_string(),
                as_of: (*as_of).to_string(),
                form,
                last_5_points: points,
                goals_scored,
                goals_conceded,
            })
        })
        .collect();

    let tx = conn.transaction().context("begin form refresh transaction")?;
    for record in &records {
        upsert_team_form(&tx, record)?;
    }
    tx.commit().context("commit form refresh transaction")?;

    Ok(FormRefreshSummary {
        matches_walked: matches.len(),
        records_written: records.len(),
    })
}

/// Share of a full month's match load carried in the 30 days before `as_of`,
/// capped at 1.0. Zero recent matches is a fully rested side.
pub fn fatigue_index(conn: &Connection, team: &str, as_of: &str) -> Result<f64> {
    let window_start = window_start(as_of)?;
    let played = store::count_matches_in_window(conn, team, &window_start, as_of)?;
    Ok((played as f64 / FATIGUE_MATCH_CAP).min(1.0))
}

fn window_start(as_of: &str) -> Result<String> {
    let parsed = DateTime::parse_from_rfc3339(as_of)
        .with_context(|| format!("unparseable as-of date {as_of}"))?
        .with_timezone(&Utc);
    Ok((parsed - Duration::days(FATIGUE_WINDOW_DAYS)).to_rfc3339())
}

fn per_match_avg(total: i64, matches: usize) -> f64 {
    if matches == 0 {
        return 0.0;
    }
    total as f64 / matches as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(goals_for: i64, goals_against: i64) -> TeamResult {
        TeamResult {
            goals_for,
            goals_against,
        }
    }

    #[test]
    fn empty_history_has_no_form() {
        assert!(form_from_history(&[]).is_none());
    }

    #[test]
    fn all_wins_is_exactly_one_for_any_window_size() {
        // Holds only if the weights are normalized over the available set.
        for n in 1..=FORM_WINDOW {
            let window = vec![result(2, 0); n];
            let (form, points, _, _) = form_from_history(&window).expect("form");
            assert!((form - 1.0).abs() < 1e-12, "window of {n}: form {form}");
            assert_eq!(points.len(), n);
        }
    }

    #[test]
    fn all_losses_is_exactly_zero() {
        let window = vec![result(0, 1); 4];
        let (form, _, _, _) = form_from_history(&window).expect("form");
        assert!(form.abs() < 1e-12);
    }

    #[test]
    fn recent_win_replacing_recent_loss_never_decreases_form() {
        let base = vec![result(0, 2), result(1, 1), result(3, 0), result(0, 1)];
        let mut improved = base.clone();
        improved[0] = result(2, 0);

        let (form_base, ..) = form_from_history(&base).expect("form");
        let (form_improved, ..) = form_from_history(&improved).expect("form");
        assert!(form_improved > form_base);
    }

    #[test]
    fn weighting_favors_the_most_recent_match() {
        // Same multiset of outcomes, win first vs win last.
        let win_first = vec![result(1, 0), result(0, 1), result(0, 1)];
        let win_last = vec![result(0, 1), result(0, 1), result(1, 0)];
        let (a, ..) = form_from_history(&win_first).expect("form");
        let (b, ..) = form_from_history(&win_last).expect("form");
        assert!(a > b);
    }

    #[test]
    fn three_match_scenario_matches_the_formula() {
        // Day 10: loss 0-2, day 5: draw 1-1, day 1: win 3-0, most recent first.
        let window = vec![result(0, 2), result(1, 1), result(3, 0)];
        let (form, points, scored, conceded) = form_from_history(&window).expect("form");

        let w0 = 1.0_f64;
        let w1 = (-0.4_f64).exp();
        let w2 = (-0.8_f64).exp();
        let total = w0 + w1 + w2;
        let expected = (0.0 / 3.0) * (w0 / total) + (1.0 / 3.0) * (w1 / total) + (3.0 / 3.0) * (w2 / total);

        assert!((form - expected).abs() < 1e-12);
        assert_eq!(points, vec![0, 1, 3]);
        assert_eq!(scored, 4);
        assert_eq!(conceded, 3);
    }

    #[test]
    fn goal_averages_are_per_counted_match() {
        let record = TeamForm {
            team: "Lille".to_string(),
            as_of: "2025-03-01T00:00:00Z".to_string(),
            form: 0.5,
            last_5_points: vec![3, 0],
            goals_scored: 5,
            goals_conceded: 2,
        };
        assert!((record.goals_scored_avg() - 2.5).abs() < 1e-12);
        assert!((record.goals_conceded_avg() - 1.0).abs() < 1e-12);
    }
}

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::store::{self, Meeting};

pub const H2H_WINDOW: usize = 5;

/// Outcome of one meeting, seen from the first team's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H2hOutcome {
    Win,
    Draw,
    Loss,
}

impl H2hOutcome {
    fn code(self) -> char {
        match self {
            H2hOutcome::Win => '1',
            H2hOutcome::Draw => 'D',
            H2hOutcome::Loss => '2',
        }
    }

    fn flipped(self) -> Self {
        match self {
            H2hOutcome::Win => H2hOutcome::Loss,
            H2hOutcome::Draw => H2hOutcome::Draw,
            H2hOutcome::Loss => H2hOutcome::Win,
        }
    }
}

/// Pairwise historical stats over the last meetings, from `team_a`'s
/// perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadToHead {
    pub team_a: String,
    pub team_b: String,
    /// Most recent first.
    pub last_5: Vec<H2hOutcome>,
    pub team_a_goals_avg: f64,
    pub team_b_goals_avg: f64,
    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub draws: u32,
}

impl HeadToHead {
    pub fn total_matches(&self) -> usize {
        self.last_5.len()
    }

    /// The same record seen from the other side.
    pub fn mirrored(self) -> Self {
        HeadToHead {
            team_a: self.team_b,
            team_b: self.team_a,
            last_5: self.last_5.iter().map(|o| o.flipped()).collect(),
            team_a_goals_avg: self.team_b_goals_avg,
            team_b_goals_avg: self.team_a_goals_avg,
            team_a_wins: self.team_b_wins,
            team_b_wins: self.team_a_wins,
            draws: self.draws,
        }
    }
}

/// Builds the perspective record from raw meetings (most recent first).
pub fn head_to_head_from_meetings(
    team_a: &str,
    team_b: &str,
    meetings: &[Meeting],
) -> Option<HeadToHead> {
    if meetings.is_empty() {
        return None;
    }

    let mut last_5 = Vec::with_capacity(meetings.len());
    let mut goals_a = 0i64;
    let mut goals_b = 0i64;
    let mut wins_a = 0u32;
    let mut wins_b = 0u32;
    let mut draws = 0u32;

    for meeting in meetings {
        // Attribute goals by which side team_a played, home or away.
        let (a_score, b_score) = if meeting.home_team == team_a {
            (meeting.home_score, meeting.away_score)
        } else {
            (meeting.away_score, meeting.home_score)
        };
        goals_a += a_score;
        goals_b += b_score;
        let outcome = if a_score > b_score {
            wins_a += 1;
            H2hOutcome::Win
        } else if a_score < b_score {
            wins_b += 1;
            H2hOutcome::Loss
        } else {
            draws += 1;
            H2hOutcome::Draw
        };
        last_5.push(outcome);
    }

    let n = meetings.len() as f64;
    Some(HeadToHead {
        team_a: team_a.to_string(),
        team_b: team_b.to_string(),
        last_5,
        team_a_goals_avg: round2(goals_a as f64 / n),
        team_b_goals_avg: round2(goals_b as f64 / n),
        team_a_wins: wins_a,
        team_b_wins: wins_b,
        draws,
    })
}

/// Recomputes the pair's stats over the 5 most recent meetings dated at or
/// before `cutoff` and replaces the stored record for the unordered pair.
/// Returns the record from `team_a`'s perspective, or `None` when the teams
/// have never met.
pub fn compute_head_to_head(
    conn: &Connection,
    team_a: &str,
    team_b: &str,
    cutoff: &str,
) -> Result<Option<HeadToHead>> {
    let meetings = store::meetings_between(conn, team_a, team_b, cutoff, H2H_WINDOW)?;
    let Some(record) = head_to_head_from_meetings(team_a, team_b, &meetings) else {
        debug!(team_a, team_b, "no meetings on record");
        return Ok(None);
    };

    upsert_head_to_head(conn, record.clone())?;
    Ok(Some(record))
}

/// Replace-semantics write keyed on the canonical (lexicographic) pair order.
fn upsert_head_to_head(conn: &Connection, record: HeadToHead) -> Result<()> {
    let canonical = if record.team_a <= record.team_b {
        record
    } else {
        record.mirrored()
    };
    let sequence: String = canonical.last_5.iter().map(|o| o.code()).collect();
    conn.execute(
        r#"
        INSERT INTO head_to_head_stats (
            team1, team2, last_5_matches,
            team1_goals_avg, team2_goals_avg,
            team1_wins, team2_wins, draws, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(team1, team2) DO UPDATE SET
            last_5_matches = excluded.last_5_matches,
            team1_goals_avg = excluded.team1_goals_avg,
            team2_goals_avg = excluded.team2_goals_avg,
            team1_wins = excluded.team1_wins,
            team2_wins = excluded.team2_wins,
            draws = excluded.draws,
            updated_at = excluded.updated_at
        "#,
        params![
            canonical.team_a,
            canonical.team_b,
            sequence,
            canonical.team_a_goals_avg,
            canonical.team_b_goals_avg,
            canonical.team_a_wins,
            canonical.team_b_wins,
            canonical.draws,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert head-to-head stats")?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct H2hRefreshSummary {
    pub pairs_considered: usize,
    pub records_written: usize,
}

/// Recomputes stats for every pair of teams that has met, in one transaction.
pub fn refresh_head_to_head(conn: &mut Connection, cutoff: &str) -> Result<H2hRefreshSummary> {
    let teams = store::distinct_teams(conn)?;
    let mut summary = H2hRefreshSummary::default();

    let tx = conn.transaction().context("begin h2h refresh transaction")?;
    for (i, team_a) in teams.iter().enumerate() {
        for team_b in teams.iter().skip(i + 1) {
            summary.pairs_considered += 1;
            if compute_head_to_head(&tx, team_a, team_b, cutoff)?.is_some() {
                summary.records_written += 1;
            }
        }
    }
    tx.commit().context("commit h2h refresh transaction")?;

    Ok(summary)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting(date: &str, home: &str, away: &str, hs: i64, aw: i64) -> Meeting {
        Meeting {
            date: date.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_score: hs,
            away_score: aw,
        }
    }

    #[test]
    fn no_meetings_yields_no_record() {
        assert!(head_to_head_from_meetings("Lyon", "Nice", &[]).is_none());
    }

    #[test]
    fn goals_follow_the_team_not_the_venue() {
        let meetings = vec![
            meeting("2025-03-01T20:00:00Z", "Lyon", "Nice", 2, 1),
            meeting("2024-11-01T20:00:00Z", "Nice", "Lyon", 0, 3),
        ];
        let record = head_to_head_from_meetings("Lyon", "Nice", &meetings).expect("record");
        assert_eq!(record.team_a_wins, 2);
        assert_eq!(record.team_b_wins, 0);
        assert!((record.team_a_goals_avg - 2.5).abs() < 1e-12);
        assert!((record.team_b_goals_avg - 0.5).abs() < 1e-12);
        assert_eq!(record.last_5, vec![H2hOutcome::Win, H2hOutcome::Win]);
    }

    #[test]
    fn mirror_swaps_every_perspective_field() {
        let meetings = vec![
            meeting("2025-03-01T20:00:00Z", "Lyon", "Nice", 2, 1),
            meeting("2025-01-01T20:00:00Z", "Nice", "Lyon", 1, 1),
            meeting("2024-11-01T20:00:00Z", "Nice", "Lyon", 2, 0),
        ];
        let a = head_to_head_from_meetings("Lyon", "Nice", &meetings).expect("record");
        let b = head_to_head_from_meetings("Nice", "Lyon", &meetings).expect("record");

        assert_eq!(a.clone().mirrored(), b);
        assert_eq!(a.team_a_wins, b.team_b_wins);
        assert_eq!(a.draws, b.draws);
        assert!((a.team_a_goals_avg - b.team_b_goals_avg).abs() < 1e-12);
        assert_eq!(
            a.last_5,
            vec![H2hOutcome::Win, H2hOutcome::Draw, H2hOutcome::Loss]
        );
        assert_eq!(
            b.last_5,
            vec![H2hOutcome::Loss, H2hOutcome::Draw, H2hOutcome::Win]
        );
    }

    #[test]
    fn averages_round_to_two_decimals() {
        let meetings = vec![
            meeting("2025-03-01T20:00:00Z", "Lyon", "Nice", 1, 0),
            meeting("2025-02-01T20:00:00Z", "Lyon", "Nice", 1, 0),
            meeting("2025-01-01T20:00:00Z", "Nice", "Lyon", 0, 0),
        ];
        let record = head_to_head_from_meetings("Lyon", "Nice", &meetings).expect("record");
        // 2 goals over 3 meetings.
        assert!((record.team_a_goals_avg - 0.67).abs() < 1e-12);
    }
}

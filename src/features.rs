use std::path::Path;
use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;
use serde::Serialize;

use crate::availability::{self, MissingReport};
use crate::form::{self, TeamForm};
use crate::head_to_head::{self, HeadToHead};
use crate::store::{self, Match};
use crate::weather::{self, WeatherProvider, WeatherRecord};

/// A team above this form score counts as in high form.
pub const HIGH_FORM_THRESHOLD: f64 = 0.7;

/// The exact field set the model boundary receives, in serialization order.
pub const FEATURE_NAMES: [&str; 25] = [
    "home_team_form",
    "away_team_form",
    "home_goals_scored_avg",
    "away_goals_scored_avg",
    "home_goals_conceded_avg",
    "away_goals_conceded_avg",
    "weather_temp",
    "weather_rain",
    "weather_wind",
    "home_missing_key_players",
    "away_missing_key_players",
    "form_difference",
    "goals_scored_diff",
    "goals_conceded_diff",
    "h2h_home_wins",
    "h2h_away_wins",
    "h2h_draws",
    "h2h_home_goals_avg",
    "h2h_away_goals_avg",
    "h2h_goal_diff",
    "h2h_experience",
    "home_high_form",
    "away_high_form",
    "home_fatigue_index",
    "away_fatigue_index",
];

/// Flat, fixed-shape feature vector for one match. Every field is always
/// present; absent form or head-to-head history shows up as zeros, never as
/// missing keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub home_team_form: f64,
    pub away_team_form: f64,
    pub home_goals_scored_avg: f64,
    pub away_goals_scored_avg: f64,
    pub home_goals_conceded_avg: f64,
    pub away_goals_conceded_avg: f64,
    pub weather_temp: f64,
    pub weather_rain: f64,
    pub weather_wind: f64,
    pub home_missing_key_players: u32,
    pub away_missing_key_players: u32,
    pub form_difference: f64,
    pub goals_scored_diff: f64,
    pub goals_conceded_diff: f64,
    pub h2h_home_wins: u32,
    pub h2h_away_wins: u32,
    pub h2h_draws: u32,
    pub h2h_home_goals_avg: f64,
    pub h2h_away_goals_avg: f64,
    pub h2h_goal_diff: f64,
    pub h2h_experience: u32,
    pub home_high_form: bool,
    pub away_high_form: bool,
    pub home_fatigue_index: f64,
    pub away_fatigue_index: f64,
}

/// Assembles the feature vector for one match. The six lookups are mutually
/// independent and run concurrently, each on its own connection; the merge
/// waits for all of them. Database and weather failures propagate to the
/// caller instead of being folded into defaults.
pub fn assemble_features(
    db_path: &Path,
    provider: &(dyn WeatherProvider + Sync),
    m: &Match,
) -> Result<FeatureRecord> {
    let day = match_day(&m.date)?;
    let stadium = m
        .stadium
        .as_deref()
        .ok_or_else(|| anyhow!("match {} has no stadium for the weather lookup", m.id))?;

    let (home, away, h2h, home_missing, away_missing, conditions) = thread::scope(|scope| {
        let home = scope.spawn(|| side_lookup(db_path, &m.home_team, &m.date));
        let away = scope.spawn(|| side_lookup(db_path, &m.away_team, &m.date));
        let h2h = scope.spawn(|| -> Result<Option<HeadToHead>> {
            let conn = store::open_db(db_path)?;
            head_to_head::compute_head_to_head(&conn, &m.home_team, &m.away_team, &m.date)
        });
        let home_missing = scope.spawn(|| -> Result<MissingReport> {
            let conn = store::open_db(db_path)?;
            availability::key_players_missing(&conn, &m.home_team, &day)
        });
        let away_missing = scope.spawn(|| -> Result<MissingReport> {
            let conn = store::open_db(db_path)?;
            availability::key_players_missing(&conn, &m.away_team, &day)
        });
        let conditions = scope.spawn(|| -> Result<WeatherRecord> {
            let conn = store::open_db(db_path)?;
            weather::fetch_match_weather(&conn, provider, stadium, &day)
        });

        (
            home.join().expect("home form lookup panicked"),
            away.join().expect("away form lookup panicked"),
            h2h.join().expect("head-to-head lookup panicked"),
            home_missing.join().expect("home availability lookup panicked"),
            away_missing.join().expect("away availability lookup panicked"),
            conditions.join().expect("weather lookup panicked"),
        )
    });

    let (home_form, home_fatigue) =
        home.with_context(|| format!("home-side lookups for {}", m.home_team))?;
    let (away_form, away_fatigue) =
        away.with_context(|| format!("away-side lookups for {}", m.away_team))?;
    let h2h = h2h.context("head-to-head lookup")?;
    let home_missing = home_missing.context("home availability lookup")?;
    let away_missing = away_missing.context("away availability lookup")?;
    let conditions = conditions.context("weather lookup")?;

    Ok(merge(
        &home_form,
        &away_form,
        home_fatigue,
        away_fatigue,
        h2h.as_ref(),
        &home_missing,
        &away_missing,
        &conditions,
    ))
}

fn side_lookup(db_path: &Path, team: &str, as_of: &str) -> Result<(Option<TeamForm>, f64)> {
    let conn = store::open_db(db_path)?;
    let form = form::compute_form(&conn, team, as_of)?;
    let fatigue = form::fatigue_index(&conn, team, as_of)?;
    Ok((form, fatigue))
}

#[allow(clippy::too_many_arguments)]
fn merge(
    home_form: &Option<TeamForm>,
    away_form: &Option<TeamForm>,
    home_fatigue: f64,
    away_fatigue: f64,
    h2h: Option<&HeadToHead>,
    home_missing: &MissingReport,
    away_missing: &MissingReport,
    conditions: &WeatherRecord,
) -> FeatureRecord {
    let home_team_form = home_form.as_ref().map_or(0.0, |f| f.form);
    let away_team_form = away_form.as_ref().map_or(0.0, |f| f.form);
    let home_goals_scored_avg = home_form.as_ref().map_or(0.0, TeamForm::goals_scored_avg);
    let away_goals_scored_avg = away_form.as_ref().map_or(0.0, TeamForm::goals_scored_avg);
    let home_goals_conceded_avg = home_form.as_ref().map_or(0.0, TeamForm::goals_conceded_avg);
    let away_goals_conceded_avg = away_form.as_ref().map_or(0.0, TeamForm::goals_conceded_avg);

    let (h2h_home_wins, h2h_away_wins, h2h_draws) =
        h2h.map_or((0, 0, 0), |r| (r.team_a_wins, r.team_b_wins, r.draws));
    let (h2h_home_goals_avg, h2h_away_goals_avg) =
        h2h.map_or((0.0, 0.0), |r| (r.team_a_goals_avg, r.team_b_goals_avg));
    let h2h_experience = h2h.map_or(0, |r| r.total_matches() as u32);

    FeatureRecord {
        home_team_form,
        away_team_form,
        home_goals_scored_avg,
        away_goals_scored_avg,
        home_goals_conceded_avg,
        away_goals_conceded_avg,
        weather_temp: conditions.temperature_c,
        weather_rain: conditions.precipitation_mm,
        weather_wind: conditions.wind_speed_kph,
        home_missing_key_players: home_missing.count as u32,
        away_missing_key_players: away_missing.count as u32,
        form_difference: home_team_form - away_team_form,
        goals_scored_diff: home_goals_scored_avg - away_goals_scored_avg,
        goals_conceded_diff: home_goals_conceded_avg - away_goals_conceded_avg,
        h2h_home_wins,
        h2h_away_wins,
        h2h_draws,
        h2h_home_goals_avg,
        h2h_away_goals_avg,
        h2h_goal_diff: h2h_home_goals_avg - h2h_away_goals_avg,
        h2h_experience,
        home_high_form: home_team_form > HIGH_FORM_THRESHOLD,
        away_high_form: away_team_form > HIGH_FORM_THRESHOLD,
        home_fatigue_index: home_fatigue,
        away_fatigue_index: away_fatigue,
    }
}

/// The calendar day a match timestamp falls on, as stored weather and
/// availability keys expect it.
pub fn match_day(date: &str) -> Result<String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return Ok(parsed.date_naive().to_string());
    }
    // Lenient fallback for plain "YYYY-MM-DD..." strings.
    let bytes = date.as_bytes();
    if bytes.len() >= 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && let Some(day) = date.get(..10)
    {
        return Ok(day.to_string());
    }
    Err(anyhow!("unparseable match date {date:?}"))
}

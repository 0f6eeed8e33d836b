use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::features::{self, FeatureRecord};
use crate::store::{self, Match};
use crate::weather::WeatherProvider;

/// One exported line: match identity plus the flattened feature vector, so
/// the training process can join predictions back to fixtures.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub match_id: i64,
    pub fixture_id: Option<i64>,
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(flatten)]
    pub features: FeatureRecord,
}

#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub assembled: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Serializes rows as JSON-lines: one object per match, newline-terminated.
pub fn write_feature_records<W: Write>(rows: &[ExportRow], out: &mut W) -> Result<()> {
    for row in rows {
        let line = serde_json::to_string(row).context("encode feature record")?;
        out.write_all(line.as_bytes()).context("write feature record")?;
        out.write_all(b"\n").context("write feature record")?;
    }
    Ok(())
}

/// Assembles and writes features for every unplayed match dated `from` or
/// later. A failing match is skipped and reported in the summary; the rest
/// of the export keeps going.
pub fn export_upcoming_features<W: Write>(
    db_path: &Path,
    provider: &(dyn WeatherProvider + Sync),
    from: &str,
    out: &mut W,
) -> Result<ExportSummary> {
    let upcoming = {
        let conn = store::open_db(db_path)?;
        store::upcoming_matches(&conn, from)?
    };

    let mut summary = ExportSummary::default();
    let mut rows = Vec::with_capacity(upcoming.len());
    for m in &upcoming {
        match features::assemble_features(db_path, provider, m) {
            Ok(record) => {
                rows.push(export_row(m, record));
                summary.assembled += 1;
            }
            Err(err) => {
                warn!(match_id = m.id, "feature assembly failed: {err:#}");
                summary.skipped += 1;
                summary
                    .errors
                    .push(format!("{} vs {}: {err:#}", m.home_team, m.away_team));
            }
        }
    }

    write_feature_records(&rows, out)?;
    Ok(summary)
}

fn export_row(m: &Match, features: FeatureRecord) -> ExportRow {
    ExportRow {
        match_id: m.id,
        fixture_id: m.fixture_id,
        date: m.date.clone(),
        home_team: m.home_team.clone(),
        away_team: m.away_team.clone(),
        features,
    }
}

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use matchform::config::Config;
use matchform::weather::HttpWeatherProvider;
use matchform::{export, form, head_to_head, store, sync};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(db) = parse_db_path_arg() {
        config.db_path = db;
    }

    match command().as_deref() {
        Some("sync") => run_sync(&config),
        Some("refresh-form") => run_refresh_form(&config),
        Some("refresh-h2h") => run_refresh_h2h(&config),
        Some("export") => run_export(&config),
        Some(other) => Err(anyhow!("unknown command {other:?}")),
        None => {
            eprintln!("usage: matchform <sync|refresh-form|refresh-h2h|export> [--db=PATH] [--out=PATH]");
            Ok(())
        }
    }
}

fn run_sync(config: &Config) -> Result<()> {
    let mut conn = store::open_db(&config.db_path)?;
    let summary = sync::sync_fixtures(&mut conn, config)?;

    println!("Fixture sync complete");
    println!("DB: {}", config.db_path.display());
    println!(
        "league {} season {}: fetched={} inserted={} updated={} skipped={}",
        config.league_id,
        config.season,
        summary.fetched,
        summary.inserted,
        summary.updated,
        summary.skipped
    );
    Ok(())
}

fn run_refresh_form(config: &Config) -> Result<()> {
    let mut conn = store::open_db(&config.db_path)?;
    let summary = form::refresh_team_form(&mut conn)?;
    println!(
        "Team form refreshed: {} records over {} matches",
        summary.records_written, summary.matches_walked
    );
    Ok(())
}

fn run_refresh_h2h(config: &Config) -> Result<()> {
    let mut conn = store::open_db(&config.db_path)?;
    let now = Utc::now().to_rfc3339();
    let summary = head_to_head::refresh_head_to_head(&mut conn, &now)?;
    println!(
        "Head-to-head refreshed: {} records from {} pairs",
        summary.records_written, summary.pairs_considered
    );
    Ok(())
}

fn run_export(config: &Config) -> Result<()> {
    let provider = HttpWeatherProvider::new(config.weather_api()?);
    let now = Utc::now().to_rfc3339();

    let summary = match parse_out_path_arg() {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("create export file {}", path.display()))?;
            let mut out = BufWriter::new(file);
            let summary =
                export::export_upcoming_features(&config.db_path, &provider, &now, &mut out)?;
            out.flush().context("flush export file")?;
            println!("Features written to {}", path.display());
            summary
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            export::export_upcoming_features(&config.db_path, &provider, &now, &mut out)?
        }
    };

    println!(
        "Export complete: assembled={} skipped={}",
        summary.assembled, summary.skipped
    );
    for err in summary.errors.iter().take(6) {
        println!(" - {err}");
    }
    Ok(())
}

fn command() -> Option<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        if arg == "--db" || arg == "--out" {
            // Skip the flag's value form `--db PATH`.
            idx += 2;
            continue;
        }
        if arg.starts_with("--") {
            idx += 1;
            continue;
        }
        return Some(arg.clone());
    }
    None
}

fn parse_db_path_arg() -> Option<PathBuf> {
    parse_path_flag("--db")
}

fn parse_out_path_arg() -> Option<PathBuf> {
    parse_path_flag("--out")
}

fn parse_path_flag(flag: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

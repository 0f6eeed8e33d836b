use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

const CACHE_DIR: &str = "matchform";
const DB_FILE: &str = "matches.sqlite";

const DEFAULT_LEAGUE_ID: u32 = 61;
const DEFAULT_SEASON: u16 = 2025;
const DEFAULT_WEATHER_API_URL: &str = "https://api.weatherapi.com/v1";

/// Credentials for the fixtures feed (API-Football style host + key headers).
#[derive(Debug, Clone)]
pub struct FixturesApi {
    pub host: String,
    pub key: String,
}

/// Credentials for the weather forecast endpoint.
#[derive(Debug, Clone)]
pub struct WeatherApi {
    pub base_url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub league_id: u32,
    pub season: u16,
    fixtures_api: Option<FixturesApi>,
    weather_api: Option<WeatherApi>,
}

impl Config {
    /// Reads configuration from the environment (a local `.env` is honored).
    /// Provider credentials are optional at load time; the accessors below
    /// fail only when a provider is actually needed.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let db_path = match opt_env("MATCHFORM_DB") {
            Some(raw) => PathBuf::from(raw),
            None => default_db_path().context("unable to resolve a database path")?,
        };

        let league_id = opt_env("LEAGUE_ID")
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(DEFAULT_LEAGUE_ID);
        let season = opt_env("SEASON")
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(DEFAULT_SEASON);

        let fixtures_api = match (opt_env("FOOTBALL_API_HOST"), opt_env("FOOTBALL_API_KEY")) {
            (Some(host), Some(key)) => Some(FixturesApi { host, key }),
            _ => None,
        };
        let weather_api = opt_env("WEATHER_API_KEY").map(|key| WeatherApi {
            base_url: opt_env("WEATHER_API_URL")
                .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string()),
            key,
        });

        Ok(Self {
            db_path,
            league_id,
            season,
            fixtures_api,
            weather_api,
        })
    }

    pub fn fixtures_api(&self) -> Result<&FixturesApi> {
        self.fixtures_api
            .as_ref()
            .context("FOOTBALL_API_HOST / FOOTBALL_API_KEY not set")
    }

    pub fn weather_api(&self) -> Result<&WeatherApi> {
        self.weather_api.as_ref().context("WEATHER_API_KEY not set")
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

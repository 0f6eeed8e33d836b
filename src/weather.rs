use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use crate::config::WeatherApi;
use crate::http_client::http_client;

/// Match-day conditions for one stadium. Immutable once stored; a cache hit
/// returns exactly what the first successful fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub stadium: String,
    /// YYYY-MM-DD.
    pub match_date: String,
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub wind_speed_kph: f64,
    pub condition: String,
}

/// Seam to the external forecast service so the cache and the assembler can
/// be exercised without network access.
pub trait WeatherProvider {
    fn fetch_forecast(&self, stadium: &str, date: &str) -> Result<WeatherRecord>;
}

/// WeatherAPI-style `forecast.json` endpoint.
pub struct HttpWeatherProvider {
    base_url: String,
    api_key: String,
}

impl HttpWeatherProvider {
    pub fn new(api: &WeatherApi) -> Self {
        Self {
            base_url: api.base_url.trim_end_matches('/').to_string(),
            api_key: api.key.clone(),
        }
    }
}

impl WeatherProvider for HttpWeatherProvider {
    fn fetch_forecast(&self, stadium: &str, date: &str) -> Result<WeatherRecord> {
        let client = http_client()?;
        let url = format!("{}/forecast.json", self.base_url);
        let resp = client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", stadium), ("dt", date)])
            .send()
            .context("weather request failed")?;

        let status = resp.status();
        let body = resp.text().context("failed reading weather body")?;
        if !status.is_success() {
            return Err(anyhow!("weather http {}: {}", status, body));
        }
        parse_forecast_json(stadium, date, &body)
    }
}

/// Maps the provider's forecast-day block onto our schema.
pub(crate) fn parse_forecast_json(stadium: &str, date: &str, body: &str) -> Result<WeatherRecord> {
    let value: Value = serde_json::from_str(body.trim()).context("invalid weather json")?;
    let day = value
        .get("forecast")
        .and_then(|f| f.get("forecastday"))
        .and_then(|days| days.get(0))
        .and_then(|d| d.get("day"))
        .ok_or_else(|| anyhow!("missing forecast.forecastday[0].day for {stadium} on {date}"))?;

    let temperature_c = day
        .get("avgtemp_c")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing avgtemp_c"))?;
    let precipitation_mm = day
        .get("totalprecip_mm")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing totalprecip_mm"))?;
    let wind_speed_kph = day
        .get("maxwind_kph")
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing maxwind_kph"))?;
    let condition = day
        .get("condition")
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(WeatherRecord {
        stadium: stadium.to_string(),
        match_date: date.to_string(),
        temperature_c,
        precipitation_mm,
        wind_speed_kph,
        condition,
    })
}

/// Cache-then-fetch. The stored row wins unconditionally; only a miss touches
/// the provider, and a provider failure propagates instead of defaulting.
pub fn fetch_match_weather(
    conn: &Connection,
    provider: &dyn WeatherProvider,
    stadium: &str,
    date: &str,
) -> Result<WeatherRecord> {
    if let Some(stored) = stored_weather(conn, stadium, date)? {
        debug!(stadium, date, "weather cache hit");
        return Ok(stored);
    }

    let record = provider
        .fetch_forecast(stadium, date)
        .with_context(|| format!("fetch weather for {stadium} on {date}"))?;
    insert_weather(conn, &record)?;
    Ok(record)
}

pub fn stored_weather(
    conn: &Connection,
    stadium: &str,
    date: &str,
) -> Result<Option<WeatherRecord>> {
    conn.query_row(
        r#"
        SELECT stadium, match_date, temperature, precipitation, wind_speed, weather_condition
        FROM stadium_conditions
        WHERE stadium = ?1 AND match_date = ?2
        "#,
        params![stadium, date],
        |row| {
            Ok(WeatherRecord {
                stadium: row.get(0)?,
                match_date: row.get(1)?,
                temperature_c: row.get(2)?,
                precipitation_mm: row.get(3)?,
                wind_speed_kph: row.get(4)?,
                condition: row.get(5)?,
            })
        },
    )
    .optional()
    .context("query stored weather")
}

fn insert_weather(conn: &Connection, record: &WeatherRecord) -> Result<()> {
    // OR IGNORE keeps the first stored row authoritative if two assemblies
    // race on the same (stadium, date).
    conn.execute(
        r#"
        INSERT OR IGNORE INTO stadium_conditions
            (stadium, match_date, temperature, precipitation, wind_speed,
             weather_condition, fetched_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            record.stadium,
            record.match_date,
            record.temperature_c,
            record.precipitation_mm,
            record.wind_speed_kph,
            record.condition,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("insert weather record")?;
    Ok(())
}

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::warn;

const DEFAULT_WU_UPDATE_URL: &str =
    "https://weatherstation.wunderground.com/weatherstation/updateweatherstation.php";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// MQTT broker as `host:port`.
    pub mqtt_broker: String,
    pub station_id: String,
    pub station_password: String,
    /// Reported to Weather Underground as `softwaretype`.
    pub software_type: String,
    /// Add a calculated dew point when the sensors do not provide one.
    pub calculate_dewpoint: bool,
    pub wu_update_url: String,
    /// File mapping canonical sensor keys to MQTT topics.
    pub sensor_map_path: PathBuf,
    /// How long a reading stays in the cache without being refreshed.
    pub sensor_lifetime: Duration,
    /// How often the cache is swept for expired readings.
    pub cache_check_interval: Duration,
    /// How often the station is updated.
    pub report_period: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("missing required env var: {key}"))
        };
        let optional =
            |key: &str, default: &str| -> String { lookup(key).unwrap_or_else(|| default.to_owned()) };

        Ok(Self {
            mqtt_broker: optional("MQTT_BROKER", "localhost:1883"),
            station_id: required("WU_STATION_ID")?,
            station_password: required("WU_STATION_PASSWORD")?,
            software_type: optional("WU_SOFTWARE_TYPE", "pws_aggregator"),
            calculate_dewpoint: optional("WU_CALCULATE_DEWPOINT", "false")
                .parse()
                .context("WU_CALCULATE_DEWPOINT must be 'true' or 'false'")?,
            wu_update_url: optional("WU_UPDATE_URL", DEFAULT_WU_UPDATE_URL),
            sensor_map_path: required("SENSOR_MAP_PATH")?.into(),
            sensor_lifetime: positive_secs("SENSOR_LIFETIME_SECS", &optional("SENSOR_LIFETIME_SECS", "300"))?,
            cache_check_interval: positive_secs("CACHE_CHECK_SECS", &optional("CACHE_CHECK_SECS", "60"))?,
            report_period: positive_secs("REPORT_PERIOD_SECS", &optional("REPORT_PERIOD_SECS", "120"))?,
        })
    }
}

fn positive_secs(key: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {raw:?}"))?;
    anyhow::ensure!(secs > 0, "{key} must be greater than zero");
    Ok(Duration::from_secs(secs))
}

// ---------------------------------------------------------------------------
// Sensor map file
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SensorMapError {
    #[error("line {line}: expected 'key = topic', got {content:?}")]
    MissingSeparator { line: usize, content: String },
    #[error("line {line}: empty {field} in {content:?}")]
    EmptyField {
        line: usize,
        field: &'static str,
        content: String,
    },
}

/// Read the sensor map file at `path`. See `parse_sensor_map` for the format.
pub async fn read_sensor_map(path: &Path) -> Result<HashMap<String, String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read sensor map {}", path.display()))?;
    parse_sensor_map(&contents)
        .with_context(|| format!("invalid sensor map {}", path.display()))
}

/// Parse `key = topic` lines into a `key → topic` map.
///
/// Blank lines and lines starting with `//` are skipped. Only the first `=`
/// separates, so topics may contain `=`. A repeated key keeps its last topic.
pub fn parse_sensor_map(contents: &str) -> Result<HashMap<String, String>, SensorMapError> {
    let mut map = HashMap::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        let (key, topic) = trimmed
            .split_once('=')
            .ok_or_else(|| SensorMapError::MissingSeparator {
                line,
                content: trimmed.to_owned(),
            })?;
        let (key, topic) = (key.trim(), topic.trim());

        for (field, value) in [("key", key), ("topic", topic)] {
            if value.is_empty() {
                return Err(SensorMapError::EmptyField {
                    line,
                    field,
                    content: trimmed.to_owned(),
                });
            }
        }

        if let Some(previous) = map.insert(key.to_owned(), topic.to_owned()) {
            warn!(line, key, previous = %previous, topic, "Sensor key defined twice; keeping the later topic");
        }
    }

    Ok(map)
}

use chrono::Weekday;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;
use tracing::{debug, info};

pub const APP_DIR: &str = "lan-monitor";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to encode session: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid week start: {0}")]
    WeekStart(String),
}

/// Client configuration, read from TOML and overridden from the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Origin of the monitoring backend, e.g. `http://192.168.1.2:8000`.
    pub origin: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_weekday")]
    pub week_start: Weekday,
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8000".to_string(),
            poll_interval_secs: 60,
            request_timeout_secs: 10,
            week_start: Weekday::Sun,
            log_level: "info".to_string(),
        }
    }
}

impl DashboardConfig {
    /// Loads `path`, or the default location when `path` is `None`. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let config: Self =
            toml::from_str(&text).map_err(|source| ConfigError::Toml { path: path.clone(), source })?;
        info!(path = %path.display(), origin = %config.origin, "Loaded config");
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

pub fn parse_weekday(raw: &str) -> Result<Weekday, ConfigError> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| ConfigError::WeekStart(raw.to_string()))
}

fn deserialize_weekday<'de, D>(deserializer: D) -> Result<Weekday, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_weekday(&raw).map_err(serde::de::Error::custom)
}

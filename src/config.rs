use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    time::Duration,
};

use log::LevelFilter;
use serde::Deserialize;

use crate::{
    error::{ExtractError, Result},
    osm::download::DEFAULT_OVERPASS_URL,
    query::sql::TagJoin,
    source::transport::RetryPolicy,
};

pub const DEFAULT_SNAPSHOT_URL: &str = "https://raw-data-api0.hotosm.org/v1";

/// Run configuration. Every field has a default, so an absent config file and
/// an empty one behave the same.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log_level: String,
    pub data_models_dir: PathBuf,
    pub xlsforms_dir: PathBuf,
    pub tag_join: TagJoin,
    pub database: DatabaseConfig,
    pub snapshot: SnapshotConfig,
    pub overpass: OverpassConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_models_dir: PathBuf::from("data_models"),
            xlsforms_dir: PathBuf::from("xlsforms"),
            tag_join: TagJoin::default(),
            database: DatabaseConfig::default(),
            snapshot: SnapshotConfig::default(),
            overpass: OverpassConfig::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
}

impl DatabaseConfig {
    /// The configured user, else the login name of the current user.
    pub fn user_or_default(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "postgres".to_string())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Deadline for the whole extraction, unbounded when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SNAPSHOT_URL.to_string(),
            poll_interval_ms: 1000,
            max_polls: 600,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            request_timeout_secs: 120,
            timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct OverpassConfig {
    pub url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl OverpassConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OVERPASS_URL.to_string(),
            request_timeout_secs: 180,
            max_retries: 2,
            retry_base_delay_ms: 5000,
        }
    }
}

impl Config {
    pub fn load(config_filepath: &Path) -> Result<Self> {
        if !config_filepath.exists() {
            return Err(ExtractError::config(format!(
                "Config file {:?} not found",
                config_filepath
            )));
        }
        let config_contents =
            read_to_string(config_filepath).map_err(|err| ExtractError::io(config_filepath, err))?;
        Self::from_yaml_str(&config_contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
            .map_err(|err| ExtractError::config(format!("Malformed config: {}", err)))
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        self.log_level.parse().map_err(|_| {
            ExtractError::config(format!(
                "Unknown log level {:?}, expected one of error, warn, info, debug, trace",
                self.log_level
            ))
        })
    }
}

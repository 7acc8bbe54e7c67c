use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

use crate::services::estimator::{DrainCheck, EstimatorConfig};
use crate::services::monitor::MonitorConfig;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string for the queue tables
    pub database_url: String,

    /// Heroku Platform API key
    pub heroku_api_key: Option<String>,

    /// Heroku app whose process groups run the workers
    pub heroku_app_name: Option<String>,

    /// Identity recorded on claimed rows (Heroku sets DYNO, e.g. "run.3")
    #[serde(default = "default_dyno")]
    pub dyno: String,

    /// Program run for each job, with the job id appended
    pub job_command: Option<String>,

    /// Address for the Prometheus scrape listener (e.g. "0.0.0.0:9000")
    pub metrics_bind_addr: Option<String>,

    /// Source dataset for `load-all`
    #[serde(default = "default_source_table")]
    pub source_table: String,

    #[serde(default = "default_source_id_column")]
    pub source_id_column: String,

    /// Read separately: envy cannot parse numbers through a flattened struct.
    #[serde(skip)]
    pub monitor: MonitorSettings,
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Read on its own, before tracing is installed.
#[derive(Debug, Default, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub log_format: LogFormat,
}

impl LogSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    pub fn json(&self) -> bool {
        self.log_format == LogFormat::Json
    }
}

/// Monitor cadence, in seconds.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MonitorSettings {
    #[serde(default = "default_tick_secs")]
    #[garde(range(min = 1, max = 3600))]
    pub monitor_tick_secs: u64,

    #[serde(default = "default_short_window_secs")]
    #[garde(range(min = 1))]
    pub short_window_secs: u64,

    #[serde(default = "default_long_window_secs")]
    #[garde(range(min = 1))]
    pub long_window_secs: u64,

    #[serde(default = "default_settle_secs")]
    #[garde(range(max = 600))]
    pub scale_settle_secs: u64,

    #[serde(default)]
    #[garde(skip)]
    pub drain_check: DrainCheck,
}

fn default_dyno() -> String {
    "local".to_string()
}

fn default_source_table() -> String {
    "crossref".to_string()
}

fn default_source_id_column() -> String {
    "id".to_string()
}

fn default_tick_secs() -> u64 {
    3
}

fn default_short_window_secs() -> u64 {
    30
}

fn default_long_window_secs() -> u64 {
    600
}

fn default_settle_secs() -> u64 {
    2
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            monitor_tick_secs: default_tick_secs(),
            short_window_secs: default_short_window_secs(),
            long_window_secs: default_long_window_secs(),
            scale_settle_secs: default_settle_secs(),
            drain_check: DrainCheck::default(),
        }
    }
}

impl MonitorSettings {
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.long_window_secs < self.short_window_secs {
            return Err(ConfigError::InvertedWindows {
                short: self.short_window_secs,
                long: self.long_window_secs,
            });
        }
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            tick: Duration::from_secs(self.monitor_tick_secs),
            estimator: EstimatorConfig {
                short_window: Duration::from_secs(self.short_window_secs),
                long_window: Duration::from_secs(self.long_window_secs),
                drain_check: self.drain_check,
            },
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.scale_settle_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config: AppConfig = envy::from_env()?;
        config.monitor = envy::from_env()?;
        config.monitor.check()?;
        Ok(config)
    }

    /// Heroku credentials, required by any command that touches the pool.
    pub fn heroku(&self) -> Result<(&str, &str), ConfigError> {
        match (self.heroku_app_name.as_deref(), self.heroku_api_key.as_deref()) {
            (Some(app), Some(key)) => Ok((app, key)),
            _ => Err(ConfigError::Missing("HEROKU_APP_NAME and HEROKU_API_KEY")),
        }
    }

    pub fn job_command(&self) -> Result<&str, ConfigError> {
        self.job_command.as_deref().ok_or(ConfigError::Missing("JOB_COMMAND"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid monitor settings: {0}")]
    Invalid(#[from] garde::Report),

    #[error("Long window ({long}s) must not be shorter than the short window ({short}s)")]
    InvertedWindows { short: u64, long: u64 },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

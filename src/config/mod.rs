mod file_config;

pub use file_config::{AutomationConfig, FileConfig, RetentionConfig};

use crate::activity_log::DEFAULT_OBSERVER_CAPACITY;
use crate::server::RequestsLoggingLevel;
use crate::settings_store::{ConfigError, RateLimitConfig, ScheduleConfig};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// A century of history.
pub const MAX_LOG_RETENTION_DAYS: u64 = 36_500;
/// One year.
pub const MAX_PRUNE_INTERVAL_HOURS: u64 = 8_760;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub credential_key: Option<String>,
    pub log_retention_days: u64,
    pub prune_interval_hours: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub credential_key: Option<String>,
    pub log_retention_days: u64,
    pub prune_interval_hours: u64,

    // Feature configs (with defaults)
    pub automation: AutomationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationSettings {
    pub initial_schedule: ScheduleConfig,
    pub initial_rate_limits: RateLimitConfig,
    pub client_timeout: Duration,
    pub page_size: usize,
    pub observer_queue_capacity: usize,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            initial_schedule: ScheduleConfig::default(),
            initial_rate_limits: RateLimitConfig::default(),
            client_timeout: Duration::from_secs(30),
            page_size: 100,
            observer_queue_capacity: DEFAULT_OBSERVER_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let credential_key = file
            .credential_key
            .or_else(|| cli.credential_key.clone());

        let retention = file.retention.unwrap_or_default();
        let log_retention_days = retention
            .log_retention_days
            .unwrap_or(cli.log_retention_days);
        let prune_interval_hours = retention
            .prune_interval_hours
            .unwrap_or(cli.prune_interval_hours);
        if log_retention_days > 0 && prune_interval_hours == 0 {
            bail!("prune_interval_hours must be at least 1 when log retention is enabled");
        }
        for (field, value, max) in [
            ("log_retention_days", log_retention_days, MAX_LOG_RETENTION_DAYS),
            ("prune_interval_hours", prune_interval_hours, MAX_PRUNE_INTERVAL_HOURS),
        ] {
            if value > max {
                return Err(ConfigError::RetentionOutOfRange { field, value, max })
                    .context("Invalid [retention] settings");
            }
        }

        // Automation settings - merge file config with defaults
        let defaults = AutomationSettings::default();
        let auto_file = file.automation.unwrap_or_default();
        let initial_schedule = ScheduleConfig {
            interval_hours: auto_file
                .interval_hours
                .unwrap_or(defaults.initial_schedule.interval_hours),
            enabled: auto_file
                .enabled
                .unwrap_or(defaults.initial_schedule.enabled),
        };
        initial_schedule
            .validate()
            .context("Invalid [automation] schedule")?;

        let default_limits = defaults.initial_rate_limits;
        let initial_rate_limits = RateLimitConfig {
            missing_movies: auto_file
                .missing_movies_limit
                .unwrap_or(default_limits.missing_movies),
            missing_episodes: auto_file
                .missing_episodes_limit
                .unwrap_or(default_limits.missing_episodes),
            cutoff_movies: auto_file
                .cutoff_movies_limit
                .unwrap_or(default_limits.cutoff_movies),
            cutoff_episodes: auto_file
                .cutoff_episodes_limit
                .unwrap_or(default_limits.cutoff_episodes),
        };
        initial_rate_limits
            .validate()
            .context("Invalid [automation] rate limits")?;

        let page_size = auto_file.page_size.map(|p| p as usize).unwrap_or(defaults.page_size);
        if page_size == 0 {
            bail!("[automation] page_size must be greater than zero");
        }
        let observer_queue_capacity = auto_file
            .observer_queue_capacity
            .unwrap_or(defaults.observer_queue_capacity);
        if observer_queue_capacity == 0 {
            bail!("[automation] observer_queue_capacity must be greater than zero");
        }

        let automation = AutomationSettings {
            initial_schedule,
            initial_rate_limits,
            client_timeout: auto_file
                .client_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(defaults.client_timeout),
            page_size,
            observer_queue_capacity,
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            credential_key,
            log_retention_days,
            prune_interval_hours,
            automation,
        })
    }

    pub fn settings_db_path(&self) -> PathBuf {
        self.db_dir.join("settings.db")
    }

    pub fn activity_db_path(&self) -> PathBuf {
        self.db_dir.join("activity.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

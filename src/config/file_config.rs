use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    /// Base64 encoded 32-byte key used to encrypt stored API keys.
    pub credential_key: Option<String>,

    // Feature configs
    pub automation: Option<AutomationConfig>,
    pub retention: Option<RetentionConfig>,
}

/// Initial automation settings, applied only when the settings database has none yet.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AutomationConfig {
    pub enabled: Option<bool>,
    pub interval_hours: Option<u32>,
    pub missing_movies_limit: Option<u32>,
    pub missing_episodes_limit: Option<u32>,
    pub cutoff_movies_limit: Option<u32>,
    pub cutoff_episodes_limit: Option<u32>,
    pub client_timeout_sec: Option<u64>,
    pub page_size: Option<u32>,
    pub observer_queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub log_retention_days: Option<u64>,
    pub prune_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

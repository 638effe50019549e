use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("interval_hours must be between {min} and {max}, got {value}")]
    IntervalOutOfRange { value: u32, min: u32, max: u32 },

    #[error("rate limit {field} must be between 0 and {max}, got {value}")]
    RateLimitOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("invalid server: {0}")]
    InvalidServer(String),

    #[error("{field} must be at most {max}, got {value}")]
    RetentionOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Which kind of library manager a server is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerCategory {
    /// A movie library manager (Radarr-compatible API).
    MovieManager,
    /// An episode library manager (Sonarr-compatible API).
    EpisodeManager,
}

impl ServerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerCategory::MovieManager => "movie_manager",
            ServerCategory::EpisodeManager => "episode_manager",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie_manager" | "radarr" => Some(ServerCategory::MovieManager),
            "episode_manager" | "sonarr" => Some(ServerCategory::EpisodeManager),
            _ => None,
        }
    }

    /// The kind of item this manager reports.
    pub fn item_kind(&self) -> ItemKind {
        match self {
            ServerCategory::MovieManager => ItemKind::Movie,
            ServerCategory::EpisodeManager => ItemKind::Episode,
        }
    }
}

impl std::fmt::Display for ServerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Movie,
    Episode,
}

/// The two search categories a cycle works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Items the library has no file for.
    Missing,
    /// Items whose file is below the quality cutoff.
    Cutoff,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Missing => "missing",
            SearchKind::Cutoff => "cutoff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "missing" => Some(SearchKind::Missing),
            "cutoff" => Some(SearchKind::Cutoff),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A configured external library manager instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedServer {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Envelope produced by [`crate::credentials::CredentialCipher::encrypt`].
    #[serde(skip_serializing)]
    pub encrypted_api_key: String,
    pub category: ServerCategory,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl ManagedServer {
    /// Build a new, enabled server record with a fresh id.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        encrypted_api_key: impl Into<String>,
        category: ServerCategory,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            encrypted_api_key: encrypted_api_key.into(),
            category,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidServer("name must not be empty".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidServer(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// How often automation cycles run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub interval_hours: u32,
    pub enabled: bool,
}

impl ScheduleConfig {
    pub const MIN_INTERVAL_HOURS: u32 = 1;
    pub const MAX_INTERVAL_HOURS: u32 = 168;

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_interval_hours(self.interval_hours)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours as u64 * 60 * 60)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            enabled: false,
        }
    }
}

pub fn validate_interval_hours(value: u32) -> Result<(), ConfigError> {
    if !(ScheduleConfig::MIN_INTERVAL_HOURS..=ScheduleConfig::MAX_INTERVAL_HOURS).contains(&value) {
        return Err(ConfigError::IntervalOutOfRange {
            value,
            min: ScheduleConfig::MIN_INTERVAL_HOURS,
            max: ScheduleConfig::MAX_INTERVAL_HOURS,
        });
    }
    Ok(())
}

/// Per-cycle ceilings on the number of items searched, one per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub missing_movies: u32,
    pub missing_episodes: u32,
    pub cutoff_movies: u32,
    pub cutoff_episodes: u32,
}

impl RateLimitConfig {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("missing_movies", self.missing_movies),
            ("missing_episodes", self.missing_episodes),
            ("cutoff_movies", self.cutoff_movies),
            ("cutoff_episodes", self.cutoff_episodes),
        ] {
            if value > Self::MAX_LIMIT {
                return Err(ConfigError::RateLimitOutOfRange {
                    field,
                    value,
                    max: Self::MAX_LIMIT,
                });
            }
        }
        Ok(())
    }

    pub fn limit_for(&self, search: SearchKind, item: ItemKind) -> u32 {
        match (search, item) {
            (SearchKind::Missing, ItemKind::Movie) => self.missing_movies,
            (SearchKind::Missing, ItemKind::Episode) => self.missing_episodes,
            (SearchKind::Cutoff, ItemKind::Movie) => self.cutoff_movies,
            (SearchKind::Cutoff, ItemKind::Episode) => self.cutoff_episodes,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            missing_movies: 10,
            missing_episodes: 10,
            cutoff_movies: 5,
            cutoff_episodes: 5,
        }
    }
}

//! Persistent settings: schedule, per-category rate limits, and managed servers.

mod models;
mod schema;
mod sqlite_settings_store;

pub use models::*;
pub use schema::SETTINGS_VERSIONED_SCHEMAS;
pub use sqlite_settings_store::SqliteSettingsStore;

use anyhow::Result;

pub trait SettingsStore: Send + Sync {
    // Process-wide settings
    /// Returns the stored schedule, or the default when none was saved yet.
    fn get_schedule_config(&self) -> Result<ScheduleConfig>;
    fn set_schedule_config(&self, config: &ScheduleConfig) -> Result<()>;
    /// Returns the stored rate limits, or the defaults when none were saved yet.
    fn get_rate_limits(&self) -> Result<RateLimitConfig>;
    fn set_rate_limits(&self, limits: &RateLimitConfig) -> Result<()>;
    /// Saves the given values for whichever of the two settings was never saved.
    fn seed_defaults(&self, schedule: &ScheduleConfig, limits: &RateLimitConfig) -> Result<()>;

    // Managed servers
    /// All servers ordered by name.
    fn list_servers(&self) -> Result<Vec<ManagedServer>>;
    fn get_server(&self, id: &str) -> Result<Option<ManagedServer>>;
    fn get_server_by_name(&self, name: &str) -> Result<Option<ManagedServer>>;
    fn create_server(&self, server: &ManagedServer) -> Result<()>;
    /// Returns false when no server has the given id.
    fn update_server(&self, server: &ManagedServer) -> Result<bool>;
    /// Returns false when no server has the given id.
    fn delete_server(&self, id: &str) -> Result<bool>;
}

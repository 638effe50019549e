//! Sweeparr: automated missing/upgrade searching for movie and episode library managers.
//!
//! This library exposes the internal modules for the binary and the end-to-end tests.

pub mod activity_log;
pub mod arr_client;
pub mod automation;
pub mod config;
pub mod context;
pub mod credentials;
pub mod health;
pub mod scheduler;
pub mod server;
pub mod settings_store;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use context::AppContext;
pub use scheduler::{AutomationScheduler, SchedulerError};
pub use server::{run_server, RequestsLoggingLevel};

//! Durable activity log with real-time, filtered broadcast to observers.

mod hub;
mod models;
mod retention;
mod schema;
mod store;

pub use hub::{BroadcastHub, ObserverFilter, ObserverId, Subscription, DEFAULT_OBSERVER_CAPACITY};
pub use models::{LogEntry, LogEntryType, LogFilter, NewLogEntry};
pub use retention::spawn_retention_task;
pub use schema::ACTIVITY_LOG_VERSIONED_SCHEMAS;
pub use store::{ActivityLogStore, SqliteActivityLogStore};

use crate::server::metrics;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Persists entries, then offers them to the broadcast hub.
pub struct ActivityLog {
    store: Arc<dyn ActivityLogStore>,
    hub: Arc<BroadcastHub>,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn ActivityLogStore>, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }

    /// Append an entry. Observers are only notified once the entry is durable.
    pub async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let persisted = self.store.append(&entry)?;
        metrics::record_log_entry(persisted.entry_type.as_str());
        self.hub.publish(persisted.clone()).await;
        Ok(persisted)
    }

    pub fn query(&self, filter: &LogFilter, limit: usize, offset: usize) -> Result<Vec<LogEntry>> {
        self.store.query(filter, limit, offset)
    }

    pub fn count(&self, filter: &LogFilter) -> Result<usize> {
        self.store.count(filter)
    }

    /// Delete entries older than `max_age_days`.
    ///
    /// An age too large to represent as a date deletes nothing.
    pub fn prune(&self, max_age_days: u64) -> Result<usize> {
        let cutoff = i64::try_from(max_age_days)
            .ok()
            .and_then(Duration::try_days)
            .and_then(|max_age| Utc::now().checked_sub_signed(max_age));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        let deleted = self.store.prune_older_than(cutoff)?;
        metrics::record_log_entries_pruned(deleted);
        Ok(deleted)
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

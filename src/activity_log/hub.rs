//! Real-time fan-out of activity log entries.
//!
//! Each observer owns a bounded queue and an independent filter. Publishing never waits on an
//! observer: when a queue is full the new message is dropped for that observer only.

use super::models::{LogEntry, LogEntryType};
use crate::server::metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

pub type ObserverId = u64;

/// Which entries an observer wants. An empty list matches everything for that clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverFilter {
    #[serde(default)]
    pub types: Vec<LogEntryType>,
    #[serde(default)]
    pub servers: Vec<String>,
}

impl ObserverFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let type_ok = self.types.is_empty() || self.types.contains(&entry.entry_type);
        let server_ok = self.servers.is_empty()
            || entry
                .server_name
                .as_ref()
                .map(|name| self.servers.contains(name))
                .unwrap_or(false);
        type_ok && server_ok
    }
}

struct Observer {
    sender: mpsc::Sender<Arc<LogEntry>>,
    filter: ObserverFilter,
}

/// A live subscription. Dropping the receiver detaches the observer on the next publish.
pub struct Subscription {
    pub id: ObserverId,
    pub receiver: mpsc::Receiver<Arc<LogEntry>>,
}

pub struct BroadcastHub {
    observers: RwLock<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, filter: ObserverFilter) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut observers = self.observers.write().await;
        observers.insert(id, Observer { sender, filter });
        metrics::set_log_observers(observers.len());
        debug!("Log observer {} subscribed ({} total)", id, observers.len());

        Subscription { id, receiver }
    }

    /// Replace an observer's filter. Returns false if the observer is gone.
    pub async fn set_filter(&self, id: ObserverId, filter: ObserverFilter) -> bool {
        let mut observers = self.observers.write().await;
        match observers.get_mut(&id) {
            Some(observer) => {
                observer.filter = filter;
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe(&self, id: ObserverId) {
        let mut observers = self.observers.write().await;
        if observers.remove(&id).is_some() {
            metrics::set_log_observers(observers.len());
            debug!("Log observer {} unsubscribed", id);
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Offer an entry to every matching observer without waiting.
    ///
    /// Returns the number of observers the entry was queued for.
    pub async fn publish(&self, entry: LogEntry) -> usize {
        let entry = Arc::new(entry);
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let observers = self.observers.read().await;
            for (id, observer) in observers.iter() {
                if !observer.filter.matches(&entry) {
                    continue;
                }
                match observer.sender.try_send(entry.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        metrics::record_broadcast_drop();
                        debug!("Log observer {} is lagging, dropping entry {}", id, entry.id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut observers = self.observers.write().await;
            for id in closed {
                observers.remove(&id);
            }
            metrics::set_log_observers(observers.len());
        }

        delivered
    }
}

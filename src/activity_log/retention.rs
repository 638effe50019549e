use super::ActivityLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodically delete log entries older than `max_age_days`.
///
/// Returns `None` without spawning anything when `max_age_days` is 0.
pub fn spawn_retention_task(
    log: Arc<ActivityLog>,
    max_age_days: u64,
    interval: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if max_age_days == 0 {
        info!("Activity log retention disabled");
        return None;
    }

    info!(
        "Activity log retention enabled: retaining {} days, pruning every {:?}",
        max_age_days, interval
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the first immediate tick, wait for the first interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Activity log retention task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match log.prune(max_age_days) {
                        Ok(count) => {
                            if count > 0 {
                                info!("Pruned {} old activity log entries", count);
                            }
                        }
                        Err(e) => {
                            error!("Failed to prune activity log: {}", e);
                        }
                    }
                }
            }
        }
    }))
}

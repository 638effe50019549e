use super::detector::Detector;
use super::models::{
    AggregatedDetection, AutomationError, CycleRecord, CycleResult, SearchSummary,
};
use super::search_trigger::SearchTrigger;
use super::CycleRunner;
use crate::activity_log::{ActivityLog, LogEntryType, NewLogEntry};
use crate::arr_client::ManagerClientFactory;
use crate::server::metrics;
use crate::settings_store::SettingsStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Composes detection, searching and logging into one automation cycle.
pub struct Orchestrator {
    settings: Arc<dyn SettingsStore>,
    detector: Detector,
    trigger: SearchTrigger,
    log: Arc<ActivityLog>,
    last_cycle: RwLock<Option<CycleRecord>>,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        clients: Arc<dyn ManagerClientFactory>,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            detector: Detector::new(settings.clone(), clients.clone()),
            trigger: SearchTrigger::new(settings.clone(), clients),
            settings,
            log,
            last_cycle: RwLock::new(None),
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// The most recently finished cycle, if any.
    pub async fn last_cycle(&self) -> Option<CycleRecord> {
        self.last_cycle.read().await.clone()
    }

    async fn append(&self, entry: NewLogEntry) -> Result<(), AutomationError> {
        self.log.append(entry).await.map_err(|e| {
            error!("Failed to append activity log entry: {}", e);
            AutomationError::Persistence(e)
        })?;
        Ok(())
    }

    pub async fn run_cycle(&self, is_manual: bool) -> Result<CycleResult, AutomationError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let origin = if is_manual { "Manual" } else { "Scheduled" };
        info!("{} automation cycle started", origin);

        self.append(
            NewLogEntry::new(LogEntryType::CycleStart, format!("{} cycle started", origin))
                .manual(is_manual),
        )
        .await?;

        let mut errors: Vec<String> = Vec::new();

        // Snapshot the server set; edits made during the cycle apply to the next one.
        let detection = match self.settings.list_servers() {
            Ok(servers) => {
                let enabled = servers.into_iter().filter(|s| s.enabled).collect();
                self.detector.detect_servers(enabled).await
            }
            Err(e) => {
                let message = format!("Failed to load managed servers: {}", e);
                warn!("{}", message);
                self.append(NewLogEntry::new(LogEntryType::Error, &message).manual(is_manual))
                    .await?;
                errors.push(message);
                AggregatedDetection::default()
            }
        };

        for result in &detection.results {
            let server = &result.server;
            match &result.error {
                Some(err) => {
                    let message = format!("Detection failed for {}: {}", server.name, err);
                    metrics::record_detection_failure(server.category.as_str());
                    self.append(
                        NewLogEntry::new(LogEntryType::Error, &message)
                            .with_server(&server.name, server.category)
                            .manual(is_manual),
                    )
                    .await?;
                    errors.push(message);
                }
                None => {
                    self.append(
                        NewLogEntry::new(
                            LogEntryType::Detection,
                            format!(
                                "Found {} missing and {} cutoff-unmet items",
                                result.missing_count, result.cutoff_count
                            ),
                        )
                        .with_server(&server.name, server.category)
                        .with_count((result.missing_count + result.cutoff_count) as i64)
                        .manual(is_manual),
                    )
                    .await?;
                }
            }
        }

        let search = match self.settings.get_rate_limits() {
            Ok(limits) => self.trigger.trigger_with_limits(&detection, &limits).await,
            Err(e) => {
                let message = format!("Failed to load rate limits, skipping searches: {}", e);
                warn!("{}", message);
                self.append(NewLogEntry::new(LogEntryType::Error, &message).manual(is_manual))
                    .await?;
                errors.push(message);
                SearchSummary::default()
            }
        };

        for failed in &search.server_errors {
            let message = format!("Search failed on {}: {}", failed.server_name, failed.error);
            self.append(
                NewLogEntry::new(LogEntryType::Error, &message)
                    .with_server(&failed.server_name, failed.server_type)
                    .manual(is_manual),
            )
            .await?;
            errors.push(message);
        }

        for outcome in &search.outcomes {
            if outcome.triggered > 0 {
                self.append(
                    NewLogEntry::new(
                        LogEntryType::Search,
                        format!("Triggered {} {} searches", outcome.triggered, outcome.category),
                    )
                    .with_server(&outcome.server_name, outcome.server_type)
                    .with_category(outcome.category)
                    .with_count(outcome.triggered as i64)
                    .manual(is_manual),
                )
                .await?;
            }
            for failure in &outcome.failures {
                let message = format!(
                    "Search failed for {} on {}: {}",
                    failure.title, outcome.server_name, failure.error
                );
                self.append(
                    NewLogEntry::new(LogEntryType::Error, &message)
                        .with_server(&outcome.server_name, outcome.server_type)
                        .with_category(outcome.category)
                        .manual(is_manual),
                )
                .await?;
                errors.push(message);
            }
        }

        let success = errors.is_empty();
        let total_searches = search.total_triggered();
        let total_failures = errors.len();

        self.append(
            NewLogEntry::new(
                LogEntryType::CycleEnd,
                format!(
                    "{} cycle finished: {} searches triggered, {} failures",
                    origin, total_searches, total_failures
                ),
            )
            .with_count(total_searches as i64)
            .manual(is_manual),
        )
        .await?;

        let record = CycleRecord {
            id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            is_manual,
            success,
            total_missing: detection.total_missing,
            total_cutoff: detection.total_cutoff,
            total_searches,
            total_failures,
            errors: errors.clone(),
        };
        *self.last_cycle.write().await = Some(record);

        let elapsed = timer.elapsed();
        metrics::record_cycle(is_manual, success, elapsed);
        info!(
            "{} automation cycle finished in {:?}: {} searches, {} failures",
            origin, elapsed, total_searches, total_failures
        );

        Ok(CycleResult {
            success,
            detection,
            search,
            total_searches,
            total_failures,
            errors,
        })
    }
}

#[async_trait]
impl CycleRunner for Orchestrator {
    async fn run_cycle(&self, is_manual: bool) -> Result<CycleResult, AutomationError> {
        Orchestrator::run_cycle(self, is_manual).await
    }
}

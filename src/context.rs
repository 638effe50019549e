//! Owned wiring of every long-lived component.
//!
//! One `AppContext` is built at startup and handed to the HTTP layer. Tests build as many
//! independent contexts as they need.

use crate::activity_log::{
    spawn_retention_task, ActivityLog, ActivityLogStore, BroadcastHub, SqliteActivityLogStore,
};
use crate::arr_client::{HttpClientFactory, ManagerClientFactory};
use crate::automation::Orchestrator;
use crate::config::AppConfig;
use crate::credentials::CredentialCipher;
use crate::scheduler::AutomationScheduler;
use crate::settings_store::{SettingsStore, SqliteSettingsStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<dyn SettingsStore>,
    pub cipher: CredentialCipher,
    pub clients: Arc<dyn ManagerClientFactory>,
    pub activity_log: Arc<ActivityLog>,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: AutomationScheduler,
    pub shutdown_token: CancellationToken,
}

impl AppContext {
    /// Open the databases under `config.db_dir` and wire everything together.
    pub fn bootstrap(config: &AppConfig, shutdown_token: CancellationToken) -> Result<Self> {
        let cipher = match &config.credential_key {
            Some(key) => {
                CredentialCipher::from_base64_key(key).context("Invalid credential_key")?
            }
            None => {
                warn!(
                    "No credential_key configured, generated one for this process. \
                     API keys stored now cannot be decrypted after a restart."
                );
                CredentialCipher::generate().0
            }
        };

        info!(
            "Opening settings database at {:?}...",
            config.settings_db_path()
        );
        let settings = SqliteSettingsStore::new(config.settings_db_path())?;
        settings
            .seed_defaults(
                &config.automation.initial_schedule,
                &config.automation.initial_rate_limits,
            )
            .context("Failed to seed automation settings")?;

        info!(
            "Opening activity log database at {:?}...",
            config.activity_db_path()
        );
        let activity_store = SqliteActivityLogStore::new(config.activity_db_path())?;

        let clients = HttpClientFactory::new(
            cipher.clone(),
            config.automation.client_timeout,
            config.automation.page_size,
        );

        Ok(Self::from_parts(
            Arc::new(settings),
            Arc::new(activity_store),
            cipher,
            Arc::new(clients),
            config.automation.observer_queue_capacity,
            shutdown_token,
        ))
    }

    pub fn from_parts(
        settings: Arc<dyn SettingsStore>,
        activity_store: Arc<dyn ActivityLogStore>,
        cipher: CredentialCipher,
        clients: Arc<dyn ManagerClientFactory>,
        observer_queue_capacity: usize,
        shutdown_token: CancellationToken,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new(observer_queue_capacity));
        let activity_log = Arc::new(ActivityLog::new(activity_store, hub));
        let orchestrator = Arc::new(Orchestrator::new(
            settings.clone(),
            clients.clone(),
            activity_log.clone(),
        ));
        let scheduler = AutomationScheduler::new(
            orchestrator.clone(),
            settings.clone(),
            shutdown_token.child_token(),
        );

        Self {
            settings,
            cipher,
            clients,
            activity_log,
            orchestrator,
            scheduler,
            shutdown_token,
        }
    }

    /// Start the scheduler (if enabled) and the log retention task (if configured).
    pub async fn start(
        &self,
        log_retention_days: u64,
        prune_interval: Duration,
    ) -> Result<Option<JoinHandle<()>>> {
        self.scheduler
            .start()
            .await
            .context("Failed to start automation scheduler")?;
        Ok(spawn_retention_task(
            self.activity_log.clone(),
            log_retention_days,
            prune_interval,
            self.shutdown_token.child_token(),
        ))
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.shutdown_token.cancel();
    }
}

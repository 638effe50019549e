use axum::extract::FromRef;

use crate::activity_log::ActivityLog;
use crate::arr_client::ManagerClientFactory;
use crate::automation::Orchestrator;
use crate::context::AppContext;
use crate::credentials::CredentialCipher;
use crate::scheduler::AutomationScheduler;
use crate::settings_store::SettingsStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedSettingsStore = Arc<dyn SettingsStore>;
pub type GuardedActivityLog = Arc<ActivityLog>;
pub type GuardedOrchestrator = Arc<Orchestrator>;
pub type GuardedClientFactory = Arc<dyn ManagerClientFactory>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub settings: GuardedSettingsStore,
    pub cipher: CredentialCipher,
    pub clients: GuardedClientFactory,
    pub activity_log: GuardedActivityLog,
    pub orchestrator: GuardedOrchestrator,
    pub scheduler: AutomationScheduler,
}

impl ServerState {
    pub fn new(config: ServerConfig, context: &AppContext) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            settings: context.settings.clone(),
            cipher: context.cipher.clone(),
            clients: context.clients.clone(),
            activity_log: context.activity_log.clone(),
            orchestrator: context.orchestrator.clone(),
            scheduler: context.scheduler.clone(),
        }
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedSettingsStore {
    fn from_ref(input: &ServerState) -> Self {
        input.settings.clone()
    }
}

impl FromRef<ServerState> for GuardedActivityLog {
    fn from_ref(input: &ServerState) -> Self {
        input.activity_log.clone()
    }
}

impl FromRef<ServerState> for GuardedOrchestrator {
    fn from_ref(input: &ServerState) -> Self {
        input.orchestrator.clone()
    }
}

impl FromRef<ServerState> for AutomationScheduler {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler.clone()
    }
}

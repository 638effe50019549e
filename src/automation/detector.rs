use super::models::{AggregatedDetection, AutomationError, DetectionResult};
use crate::arr_client::ManagerClientFactory;
use crate::settings_store::{ManagedServer, ServerCategory, SettingsStore};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Queries managers for missing and cutoff-unmet items.
pub struct Detector {
    settings: Arc<dyn SettingsStore>,
    clients: Arc<dyn ManagerClientFactory>,
}

impl Detector {
    pub fn new(settings: Arc<dyn SettingsStore>, clients: Arc<dyn ManagerClientFactory>) -> Self {
        Self { settings, clients }
    }

    /// Detect on every enabled server.
    pub async fn detect_all(&self) -> Result<AggregatedDetection, AutomationError> {
        let servers = self.enabled_servers()?;
        Ok(self.detect_servers(servers).await)
    }

    /// Detect on every enabled server of one category.
    pub async fn detect_by_category(
        &self,
        category: ServerCategory,
    ) -> Result<AggregatedDetection, AutomationError> {
        let servers = self
            .enabled_servers()?
            .into_iter()
            .filter(|s| s.category == category)
            .collect();
        Ok(self.detect_servers(servers).await)
    }

    /// Detect on one server, looked up by id and then by name. Disabled servers are included.
    pub async fn detect_single(
        &self,
        id_or_name: &str,
    ) -> Result<Option<DetectionResult>, AutomationError> {
        let server = match self.settings.get_server(id_or_name)? {
            Some(server) => Some(server),
            None => self.settings.get_server_by_name(id_or_name)?,
        };
        match server {
            Some(server) => Ok(Some(self.detect_server(server).await)),
            None => Ok(None),
        }
    }

    /// Query all given servers concurrently. Results keep the order of `servers`.
    pub async fn detect_servers(&self, servers: Vec<ManagedServer>) -> AggregatedDetection {
        let results = join_all(servers.into_iter().map(|s| self.detect_server(s))).await;
        AggregatedDetection::from_results(results)
    }

    fn enabled_servers(&self) -> Result<Vec<ManagedServer>, AutomationError> {
        Ok(self
            .settings
            .list_servers()?
            .into_iter()
            .filter(|s| s.enabled)
            .collect())
    }

    async fn detect_server(&self, server: ManagedServer) -> DetectionResult {
        let client = match self.clients.client_for(&server) {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not build client for {}: {}", server.name, e);
                return DetectionResult::failed(server, e.to_string());
            }
        };

        let missing = match client.list_missing().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Missing-items query failed for {}: {}", server.name, e);
                return DetectionResult::failed(server, e.to_string());
            }
        };

        match client.list_cutoff_unmet().await {
            Ok(cutoff) => {
                debug!(
                    "{}: {} missing, {} below cutoff",
                    server.name,
                    missing.len(),
                    cutoff.len()
                );
                DetectionResult::succeeded(server, missing, cutoff)
            }
            Err(e) => {
                warn!("Cutoff query failed for {}: {}", server.name, e);
                DetectionResult::partially_failed(server, missing, e.to_string())
            }
        }
    }
}

use super::models::{
    AggregatedDetection, AutomationError, DetectionResult, SearchFailure, SearchOutcome,
    SearchSummary, ServerSearchError,
};
use crate::arr_client::{ManagerClient, ManagerClientFactory};
use crate::server::metrics;
use crate::settings_store::{ItemKind, RateLimitConfig, SearchKind, SettingsStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SEARCH_ORDER: [SearchKind; 2] = [SearchKind::Missing, SearchKind::Cutoff];

/// Running per-category counters shared by every server in one cycle.
#[derive(Debug, Default)]
struct CycleBudget {
    used: HashMap<(SearchKind, ItemKind), u32>,
}

impl CycleBudget {
    /// Consume one unit of budget, or return false if the category is exhausted.
    fn try_take(&mut self, limits: &RateLimitConfig, search: SearchKind, item: ItemKind) -> bool {
        let used = self.used.entry((search, item)).or_insert(0);
        if *used >= limits.limit_for(search, item) {
            return false;
        }
        *used += 1;
        true
    }
}

/// Dispatches searches for detected items under the per-cycle rate limits.
pub struct SearchTrigger {
    settings: Arc<dyn SettingsStore>,
    clients: Arc<dyn ManagerClientFactory>,
}

impl SearchTrigger {
    pub fn new(settings: Arc<dyn SettingsStore>, clients: Arc<dyn ManagerClientFactory>) -> Self {
        Self { settings, clients }
    }

    /// Trigger searches using the currently stored rate limits.
    pub async fn trigger_searches(
        &self,
        detection: &AggregatedDetection,
    ) -> Result<SearchSummary, AutomationError> {
        let limits = self.settings.get_rate_limits()?;
        Ok(self.trigger_with_limits(detection, &limits).await)
    }

    /// Walk servers in detection order, then items in reported order, until each category's
    /// budget is spent. Servers whose detection failed are skipped.
    pub async fn trigger_with_limits(
        &self,
        detection: &AggregatedDetection,
        limits: &RateLimitConfig,
    ) -> SearchSummary {
        let mut budget = CycleBudget::default();
        let mut summary = SearchSummary::default();

        for result in detection.results.iter().filter(|r| !r.is_failed()) {
            let client = match self.clients.client_for(&result.server) {
                Ok(client) => client,
                Err(e) => {
                    warn!("Could not build client for {}: {}", result.server.name, e);
                    summary.failure_count += 1;
                    summary.server_errors.push(ServerSearchError {
                        server_id: result.server.id.clone(),
                        server_name: result.server.name.clone(),
                        server_type: result.server.category,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let mut server_failed = false;
            for kind in SEARCH_ORDER {
                let outcome = self
                    .search_category(client.as_ref(), result, kind, limits, &mut budget)
                    .await;
                if let Some(outcome) = outcome {
                    server_failed |= !outcome.failures.is_empty();
                    match kind {
                        SearchKind::Missing => summary.missing_triggered += outcome.triggered,
                        SearchKind::Cutoff => summary.cutoff_triggered += outcome.triggered,
                    }
                    summary.outcomes.push(outcome);
                }
            }

            if server_failed {
                summary.failure_count += 1;
            } else {
                summary.success_count += 1;
            }
        }

        info!(
            "Triggered {} missing and {} cutoff searches",
            summary.missing_triggered, summary.cutoff_triggered
        );
        summary
    }

    /// Returns `None` when nothing was attempted for this category.
    async fn search_category(
        &self,
        client: &dyn ManagerClient,
        result: &DetectionResult,
        kind: SearchKind,
        limits: &RateLimitConfig,
        budget: &mut CycleBudget,
    ) -> Option<SearchOutcome> {
        let server = &result.server;
        let item_kind = server.category.item_kind();
        let mut outcome = SearchOutcome {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            server_type: server.category,
            category: kind,
            attempted: 0,
            triggered: 0,
            failures: Vec::new(),
        };

        for item in result.items(kind) {
            if !budget.try_take(limits, kind, item_kind) {
                debug!(
                    "{} {:?} budget exhausted, skipping remaining items on {}",
                    kind, item_kind, server.name
                );
                break;
            }
            outcome.attempted += 1;
            match client.trigger_search(item.id).await {
                Ok(()) => outcome.triggered += 1,
                Err(e) => {
                    warn!(
                        "Search for {} ({}) on {} failed: {}",
                        item.title, item.id, server.name, e
                    );
                    metrics::record_search_failure(kind.as_str());
                    outcome.failures.push(SearchFailure {
                        item_id: item.id,
                        title: item.title.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let item_kind_label = match item_kind {
            ItemKind::Movie => "movie",
            ItemKind::Episode => "episode",
        };
        metrics::record_searches_triggered(kind.as_str(), item_kind_label, outcome.triggered);

        (outcome.attempted > 0).then_some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arr_client::{ClientError, MockManagerClient};
    use crate::automation::test_support::{items, settings_with, settings_with_servers, StaticFactory};
    use crate::settings_store::{ManagedServer, ServerCategory};
    use std::sync::Mutex;

    fn limits(missing: u32, cutoff: u32) -> RateLimitConfig {
        RateLimitConfig {
            missing_movies: missing,
            missing_episodes: missing,
            cutoff_movies: cutoff,
            cutoff_episodes: cutoff,
        }
    }

    /// A client that records every triggered id.
    fn recording_client(calls: Arc<Mutex<Vec<i64>>>) -> MockManagerClient {
        let mut client = MockManagerClient::new();
        client.expect_trigger_search().returning(move |id| {
            calls.lock().unwrap().push(id);
            Ok(())
        });
        client
    }

    #[tokio::test]
    async fn zero_limit_disables_category() {
        let (settings, servers) = settings_with(&["a"]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = StaticFactory::default().with(&servers[0], recording_client(calls.clone()));
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![DetectionResult::succeeded(
            servers[0].clone(),
            items(ItemKind::Movie, 1, 5),
            items(ItemKind::Movie, 100, 3),
        )]);
        let summary = trigger
            .trigger_with_limits(&detection, &limits(0, 5))
            .await;

        assert_eq!(summary.missing_triggered, 0);
        assert_eq!(summary.cutoff_triggered, 3);
        assert_eq!(*calls.lock().unwrap(), vec![100, 101, 102]);
    }

    #[tokio::test]
    async fn limit_is_shared_across_servers_first_n_wins() {
        let (settings, servers) = settings_with(&["a", "b"]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = StaticFactory::default()
            .with(&servers[0], recording_client(calls.clone()))
            .with(&servers[1], recording_client(calls.clone()));
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![
            DetectionResult::succeeded(servers[0].clone(), items(ItemKind::Movie, 1, 3), vec![]),
            DetectionResult::succeeded(servers[1].clone(), items(ItemKind::Movie, 10, 3), vec![]),
        ]);
        let summary = trigger
            .trigger_with_limits(&detection, &limits(4, 0))
            .await;

        assert_eq!(summary.missing_triggered, 4);
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3, 10]);
        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.outcomes[1].attempted, 1);
        assert_eq!(summary.success_count, 2);
    }

    #[tokio::test]
    async fn movie_and_episode_budgets_are_independent() {
        let (settings, servers) = settings_with_servers(vec![
            ManagedServer::new("movies", "http://radarr", "k", ServerCategory::MovieManager),
            ManagedServer::new("shows", "http://sonarr", "k", ServerCategory::EpisodeManager),
        ]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = StaticFactory::default()
            .with(&servers[0], recording_client(calls.clone()))
            .with(&servers[1], recording_client(calls.clone()));
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![
            DetectionResult::succeeded(servers[0].clone(), items(ItemKind::Movie, 1, 5), vec![]),
            DetectionResult::succeeded(
                servers[1].clone(),
                items(ItemKind::Episode, 50, 5),
                vec![],
            ),
        ]);
        let limits = RateLimitConfig {
            missing_movies: 2,
            missing_episodes: 1,
            cutoff_movies: 0,
            cutoff_episodes: 0,
        };
        let summary = trigger.trigger_with_limits(&detection, &limits).await;

        assert_eq!(summary.missing_triggered, 3);
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 50]);
    }

    #[tokio::test]
    async fn failed_detection_results_are_skipped() {
        let (settings, servers) = settings_with(&["a", "b"]);
        let mut untouched = MockManagerClient::new();
        untouched.expect_trigger_search().never();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = StaticFactory::default()
            .with(&servers[0], untouched)
            .with(&servers[1], recording_client(calls.clone()));
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![
            DetectionResult::partially_failed(
                servers[0].clone(),
                items(ItemKind::Movie, 1, 3),
                "cutoff failed",
            ),
            DetectionResult::succeeded(servers[1].clone(), items(ItemKind::Movie, 10, 1), vec![]),
        ]);
        let summary = trigger
            .trigger_with_limits(&detection, &limits(10, 10))
            .await;

        assert_eq!(summary.missing_triggered, 1);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 0);
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_remaining_items() {
        let (settings, servers) = settings_with(&["a"]);
        let mut client = MockManagerClient::new();
        client.expect_trigger_search().returning(|id| {
            if id == 2 {
                Err(ClientError::Status {
                    status: 503,
                    message: "indexer down".into(),
                })
            } else {
                Ok(())
            }
        });
        let factory = StaticFactory::default().with(&servers[0], client);
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![DetectionResult::succeeded(
            servers[0].clone(),
            items(ItemKind::Movie, 1, 3),
            items(ItemKind::Movie, 100, 1),
        )]);
        let summary = trigger
            .trigger_with_limits(&detection, &limits(10, 10))
            .await;

        assert_eq!(summary.missing_triggered, 2);
        assert_eq!(summary.cutoff_triggered, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.success_count, 0);

        let missing = &summary.outcomes[0];
        assert_eq!(missing.attempted, 3);
        assert_eq!(missing.failures.len(), 1);
        assert_eq!(missing.failures[0].item_id, 2);
        assert!(missing.failures[0].error.contains("indexer down"));
    }

    #[tokio::test]
    async fn failed_calls_consume_budget() {
        let (settings, servers) = settings_with(&["a"]);
        let mut client = MockManagerClient::new();
        client
            .expect_trigger_search()
            .times(2)
            .returning(|_| Err(ClientError::Network("refused".into())));
        let factory = StaticFactory::default().with(&servers[0], client);
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![DetectionResult::succeeded(
            servers[0].clone(),
            items(ItemKind::Movie, 1, 5),
            vec![],
        )]);
        let summary = trigger
            .trigger_with_limits(&detection, &limits(2, 0))
            .await;
        assert_eq!(summary.missing_triggered, 0);
        assert_eq!(summary.outcomes[0].failures.len(), 2);
    }

    #[tokio::test]
    async fn unbuildable_client_is_reported_and_others_still_searched() {
        let (settings, servers) = settings_with(&["a", "b"]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        // No client registered for "a"
        let factory = StaticFactory::default().with(&servers[1], recording_client(calls.clone()));
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![
            DetectionResult::succeeded(servers[0].clone(), items(ItemKind::Movie, 1, 3), vec![]),
            DetectionResult::succeeded(servers[1].clone(), items(ItemKind::Movie, 10, 2), vec![]),
        ]);
        let summary = trigger
            .trigger_with_limits(&detection, &limits(10, 10))
            .await;

        assert_eq!(*calls.lock().unwrap(), vec![10, 11]);
        assert_eq!(summary.missing_triggered, 2);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.server_errors.len(), 1);
        assert_eq!(summary.server_errors[0].server_name, "a");
        assert!(summary.server_errors[0].error.contains("no client for a"));
        // Nothing was attempted on the unreachable server
        assert!(summary.outcomes.iter().all(|o| o.server_name == "b"));
    }

    #[tokio::test]
    async fn trigger_searches_reads_stored_limits() {
        let (settings, servers) = settings_with(&["a"]);
        settings.set_rate_limits(&limits(1, 0)).unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let factory = StaticFactory::default().with(&servers[0], recording_client(calls.clone()));
        let trigger = SearchTrigger::new(settings, Arc::new(factory));

        let detection = AggregatedDetection::from_results(vec![DetectionResult::succeeded(
            servers[0].clone(),
            items(ItemKind::Movie, 1, 5),
            items(ItemKind::Movie, 100, 5),
        )]);
        let summary = trigger.trigger_searches(&detection).await.unwrap();
        assert_eq!(summary.total_triggered(), 1);
    }
}

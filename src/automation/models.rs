use crate::arr_client::DetectionItem;
use crate::settings_store::{ManagedServer, SearchKind, ServerCategory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    /// The log or config store could not be written or read.
    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// What one server reported during detection.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub server: ManagedServer,
    pub missing_count: usize,
    pub cutoff_count: usize,
    pub missing_items: Vec<DetectionItem>,
    pub cutoff_items: Vec<DetectionItem>,
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn succeeded(
        server: ManagedServer,
        missing_items: Vec<DetectionItem>,
        cutoff_items: Vec<DetectionItem>,
    ) -> Self {
        Self {
            server,
            missing_count: missing_items.len(),
            cutoff_count: cutoff_items.len(),
            missing_items,
            cutoff_items,
            error: None,
        }
    }

    /// A result with no data at all.
    pub fn failed(server: ManagedServer, error: impl Into<String>) -> Self {
        Self {
            server,
            missing_count: 0,
            cutoff_count: 0,
            missing_items: Vec::new(),
            cutoff_items: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Missing items were fetched but the cutoff query failed.
    pub fn partially_failed(
        server: ManagedServer,
        missing_items: Vec<DetectionItem>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            server,
            missing_count: missing_items.len(),
            cutoff_count: 0,
            missing_items,
            cutoff_items: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn items(&self, kind: SearchKind) -> &[DetectionItem] {
        match kind {
            SearchKind::Missing => &self.missing_items,
            SearchKind::Cutoff => &self.cutoff_items,
        }
    }
}

/// Cycle-wide detection summary. Totals only count results without an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedDetection {
    pub results: Vec<DetectionResult>,
    pub total_missing: usize,
    pub total_cutoff: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl AggregatedDetection {
    pub fn from_results(results: Vec<DetectionResult>) -> Self {
        let mut aggregated = Self::default();
        for result in &results {
            if result.is_failed() {
                aggregated.failure_count += 1;
            } else {
                aggregated.success_count += 1;
                aggregated.total_missing += result.missing_count;
                aggregated.total_cutoff += result.cutoff_count;
            }
        }
        aggregated.results = results;
        aggregated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchFailure {
    pub item_id: i64,
    pub title: String,
    pub error: String,
}

/// Searches issued for one server and one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub server_id: String,
    pub server_name: String,
    pub server_type: ServerCategory,
    pub category: SearchKind,
    pub attempted: u32,
    pub triggered: u32,
    pub failures: Vec<SearchFailure>,
}

/// A server that could not be searched at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSearchError {
    pub server_id: String,
    pub server_name: String,
    pub server_type: ServerCategory,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub outcomes: Vec<SearchOutcome>,
    pub server_errors: Vec<ServerSearchError>,
    pub missing_triggered: u32,
    pub cutoff_triggered: u32,
    /// Servers searched without any failed trigger call.
    pub success_count: usize,
    /// Servers with at least one failed trigger call, or no usable client.
    pub failure_count: usize,
}

impl SearchSummary {
    pub fn total_triggered(&self) -> u32 {
        self.missing_triggered + self.cutoff_triggered
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub success: bool,
    pub detection: AggregatedDetection,
    pub search: SearchSummary,
    pub total_searches: u32,
    pub total_failures: usize,
    pub errors: Vec<String>,
}

/// Summary of a finished cycle, kept as the process-wide last-cycle snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub is_manual: bool,
    pub success: bool,
    pub total_missing: usize,
    pub total_cutoff: usize,
    pub total_searches: u32,
    pub total_failures: usize,
    pub errors: Vec<String>,
}

impl CycleRecord {
    pub fn origin(&self) -> &'static str {
        if self.is_manual {
            "manual"
        } else {
            "scheduled"
        }
    }
}

//! The automation engine: detection, rate-limited searching, and cycle orchestration.

mod detector;
mod models;
mod orchestrator;
mod search_trigger;

pub use detector::Detector;
pub use models::{
    AggregatedDetection, AutomationError, CycleRecord, CycleResult, DetectionResult,
    SearchFailure, SearchOutcome, SearchSummary, ServerSearchError,
};
pub use orchestrator::Orchestrator;
pub use search_trigger::SearchTrigger;

use async_trait::async_trait;

/// Something that can execute one automation cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self, is_manual: bool) -> Result<CycleResult, AutomationError>;
}

//! Health report derived from scheduler state, the last cycle and recent log errors.

use crate::activity_log::{ActivityLog, LogEntryType, LogFilter};
use crate::automation::{CycleRecord, Orchestrator};
use crate::scheduler::{AutomationScheduler, SchedulerStatus};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::warn;

/// Window in which logged errors degrade the health state.
pub const RECENT_ERROR_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub issues: Vec<String>,
    pub scheduler: Option<SchedulerStatus>,
    pub last_cycle: Option<CycleRecord>,
    pub recent_errors: Option<usize>,
    pub observers: usize,
}

pub async fn check(
    scheduler: &AutomationScheduler,
    orchestrator: &Orchestrator,
    log: &ActivityLog,
) -> HealthReport {
    let mut issues = Vec::new();

    let scheduler_status = match scheduler.get_status().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("Health check could not read scheduler status: {}", e);
            issues.push(format!("Scheduler status unavailable: {}", e));
            None
        }
    };

    let since = Utc::now() - Duration::minutes(RECENT_ERROR_WINDOW_MINUTES);
    let recent_errors = match log.count(
        &LogFilter::default()
            .with_types(vec![LogEntryType::Error])
            .since(since),
    ) {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Health check could not count recent errors: {}", e);
            issues.push(format!("Activity log unavailable: {}", e));
            None
        }
    };

    let last_cycle = orchestrator.last_cycle().await;
    let status = classify(
        scheduler_status.as_ref(),
        last_cycle.as_ref(),
        recent_errors,
        &mut issues,
    );

    HealthReport {
        status,
        issues,
        scheduler: scheduler_status,
        last_cycle,
        recent_errors,
        observers: log.hub().observer_count().await,
    }
}

/// `issues` comes in holding any read failures; those alone make the state `Error`.
fn classify(
    scheduler: Option<&SchedulerStatus>,
    last_cycle: Option<&CycleRecord>,
    recent_errors: Option<usize>,
    issues: &mut Vec<String>,
) -> HealthState {
    let mut state = if issues.is_empty() {
        HealthState::Healthy
    } else {
        HealthState::Error
    };

    if let Some(status) = scheduler {
        if status.config.enabled && !status.is_running {
            issues.push("Automation is enabled but the scheduler is not running".to_string());
            state = HealthState::Error;
        }
    }

    if state == HealthState::Healthy {
        if let Some(cycle) = last_cycle.filter(|c| !c.success) {
            issues.push(format!(
                "Last cycle finished with {} errors",
                cycle.total_failures
            ));
            state = HealthState::Degraded;
        }
        if let Some(count) = recent_errors.filter(|c| *c > 0) {
            issues.push(format!(
                "{} errors logged in the last {} minutes",
                count, RECENT_ERROR_WINDOW_MINUTES
            ));
            state = HealthState::Degraded;
        }
    }

    state
}

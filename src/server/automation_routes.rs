//! Automation control HTTP routes.
//!
//! Provides endpoints for:
//! - Scheduler status and start/stop
//! - Manual cycles and on-demand detection
//! - Schedule and rate limit configuration

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::scheduler::{AutomationScheduler, SchedulerError};
use crate::server::metrics::record_error;
use crate::server::state::{GuardedOrchestrator, GuardedSettingsStore, ServerState};
use crate::settings_store::{RateLimitConfig, ServerCategory};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ScheduleUpdateBody {
    pub interval_hours: Option<u32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    pub category: Option<String>,
    /// Server id or name; detects on that server only.
    pub server: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub message: String,
}

pub(super) fn scheduler_error_response(e: SchedulerError) -> Response {
    match e {
        SchedulerError::CycleInProgress => (StatusCode::CONFLICT, e.to_string()).into_response(),
        SchedulerError::Config(_) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        SchedulerError::Persistence(_) | SchedulerError::CycleFailed(_) => {
            warn!("Automation request failed: {}", e);
            record_error("persistence", "automation");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// =============================================================================
// Routes
// =============================================================================

/// - GET /status
/// - POST /start
/// - POST /stop
/// - POST /trigger
/// - PUT /schedule
/// - GET /rate-limits
/// - PUT /rate-limits
/// - GET /last-cycle
/// - POST /detect
pub fn automation_routes() -> Router<ServerState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_scheduler))
        .route("/stop", post(stop_scheduler))
        .route("/trigger", post(trigger_cycle))
        .route("/schedule", put(update_schedule))
        .route("/rate-limits", get(get_rate_limits).put(put_rate_limits))
        .route("/last-cycle", get(get_last_cycle))
        .route("/detect", post(detect))
}

/// GET /status - Scheduler state and schedule config
async fn get_status(State(scheduler): State<AutomationScheduler>) -> Response {
    match scheduler.get_status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

/// POST /start - Start the scheduler if automation is enabled
async fn start_scheduler(State(scheduler): State<AutomationScheduler>) -> Response {
    if let Err(e) = scheduler.start().await {
        return scheduler_error_response(e);
    }
    get_status(State(scheduler)).await
}

/// POST /stop - Stop the scheduler; an active cycle still finishes
async fn stop_scheduler(State(scheduler): State<AutomationScheduler>) -> Response {
    scheduler.stop().await;
    get_status(State(scheduler)).await
}

/// POST /trigger - Start a manual cycle in the background
async fn trigger_cycle(State(scheduler): State<AutomationScheduler>) -> Response {
    match scheduler.spawn_manual() {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(TriggerResponse {
                message: "Manual cycle started".to_string(),
            }),
        )
            .into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

/// PUT /schedule - Change interval and/or enabled flag
async fn update_schedule(
    State(scheduler): State<AutomationScheduler>,
    Json(body): Json<ScheduleUpdateBody>,
) -> Response {
    info!(
        "Schedule update requested: interval_hours={:?} enabled={:?}",
        body.interval_hours, body.enabled
    );
    match scheduler.reconfigure(body.interval_hours, body.enabled).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

/// GET /rate-limits
async fn get_rate_limits(State(settings): State<GuardedSettingsStore>) -> Response {
    match settings.get_rate_limits() {
        Ok(limits) => Json(limits).into_response(),
        Err(e) => {
            warn!("Failed to read rate limits: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read rate limits").into_response()
        }
    }
}

/// PUT /rate-limits - Replace all four limits
async fn put_rate_limits(
    State(settings): State<GuardedSettingsStore>,
    Json(limits): Json<RateLimitConfig>,
) -> Response {
    if let Err(e) = limits.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match settings.set_rate_limits(&limits) {
        Ok(()) => {
            info!("Rate limits updated: {:?}", limits);
            Json(limits).into_response()
        }
        Err(e) => {
            warn!("Failed to save rate limits: {}", e);
            record_error("persistence", "rate_limits");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to save rate limits").into_response()
        }
    }
}

/// GET /last-cycle - Summary of the most recently finished cycle
async fn get_last_cycle(State(orchestrator): State<GuardedOrchestrator>) -> Response {
    match orchestrator.last_cycle().await {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, "No cycle has finished yet").into_response(),
    }
}

/// POST /detect - Run detection without searching
async fn detect(
    State(orchestrator): State<GuardedOrchestrator>,
    Query(query): Query<DetectQuery>,
) -> Response {
    let detector = orchestrator.detector();

    if let Some(server) = query.server {
        return match detector.detect_single(&server).await {
            Ok(Some(result)) => Json(result).into_response(),
            Ok(None) => (StatusCode::NOT_FOUND, format!("Unknown server: {}", server))
                .into_response(),
            Err(e) => {
                warn!("Detection failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        };
    }

    let result = match query.category.as_deref() {
        None => detector.detect_all().await,
        Some(raw) => match ServerCategory::parse(raw) {
            Some(category) => detector.detect_by_category(category).await,
            None => {
                return (StatusCode::BAD_REQUEST, format!("Unknown category: {}", raw))
                    .into_response()
            }
        },
    };

    match result {
        Ok(aggregated) => Json(aggregated).into_response(),
        Err(e) => {
            warn!("Detection failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::time::Duration;

use tracing::info;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::automation_routes::automation_routes;
use super::log_routes::log_routes;
use super::metrics::metrics_handler;
use super::server_routes::server_routes;
use super::websocket::ws_handler;
use super::{log_requests, state::*, ServerConfig};
use crate::context::AppContext;
use crate::health::{self, HealthState};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        hash: env!("GIT_HASH").to_string(),
    };
    Json(stats)
}

/// GET /health - 200 when healthy or degraded, 503 on error
async fn get_health(State(state): State<ServerState>) -> Response {
    let report = health::check(&state.scheduler, &state.orchestrator, &state.activity_log).await;
    let status = match report.status {
        HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
        HealthState::Error => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}

pub fn make_app(config: ServerConfig, context: &AppContext) -> Router {
    let state = ServerState::new(config, context);

    let api_routes: Router<ServerState> = Router::new()
        .nest("/automation", automation_routes())
        .nest("/servers", server_routes())
        .nest("/logs", log_routes())
        .route("/ws", get(ws_handler));

    Router::new()
        .route("/", get(home))
        .route("/health", get(get_health))
        .nest("/v1", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the API and the metrics endpoint until either fails or `shutdown` is cancelled.
pub async fn run_server(
    context: &AppContext,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, context);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    let api_shutdown = shutdown.clone();
    let metrics_shutdown = shutdown.clone();
    tokio::select! {
        result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_shutdown.cancelled().await })
            .into_future() => {
            result.context("HTTP server failed")
        }
        result = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .into_future() => {
            result.context("Metrics server failed")
        }
    }
}

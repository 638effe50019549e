//! Fake movie/episode manager used as the remote end of automation cycles.
//!
//! Serves the subset of the v3 API the client talks to and records every
//! search command it receives.

use super::constants::*;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
struct FakeManagerState {
    commands: Mutex<Vec<Value>>,
}

/// A running fake manager. The listener task lives as long as the test runtime.
pub struct FakeManager {
    pub base_url: String,
    state: Arc<FakeManagerState>,
}

impl FakeManager {
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeManagerState::default());
        let app = Router::new()
            .route("/api/v3/wanted/missing", get(wanted_missing))
            .route("/api/v3/wanted/cutoff", get(wanted_cutoff))
            .route("/api/v3/command", post(command))
            .route("/api/v3/system/status", get(system_status))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake manager");
        let addr = listener.local_addr().expect("Failed to get local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Search commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<Value> {
        self.state.commands.lock().unwrap().clone()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == FAKE_API_KEY)
        .unwrap_or(false)
}

fn records(first_id: i64, count: usize) -> Value {
    let records: Vec<Value> = (0..count as i64)
        .map(|i| json!({"id": first_id + i, "title": format!("Item {}", first_id + i)}))
        .collect();
    json!({"page": 1, "totalRecords": count, "records": records})
}

async fn wanted_missing(
    headers: HeaderMap,
    Query(_params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(records(100, FAKE_MISSING_COUNT)))
}

async fn wanted_cutoff(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(records(200, FAKE_CUTOFF_COUNT)))
}

async fn command(
    State(state): State<Arc<FakeManagerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    state.commands.lock().unwrap().push(body);
    StatusCode::CREATED
}

async fn system_status(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(
        json!({"appName": FAKE_APP_NAME, "version": FAKE_APP_VERSION}),
    ))
}

//! Managed server HTTP routes.
//!
//! API keys are accepted in plaintext on write, stored encrypted, and never returned.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::arr_client::ConnectionInfo;
use crate::server::metrics::record_error;
use crate::server::state::ServerState;
use crate::settings_store::{ManagedServer, ServerCategory};

#[derive(Debug, Deserialize)]
pub struct CreateServerBody {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateServerBody {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub category: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    #[serde(flatten)]
    pub info: Option<ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn parse_category(raw: &str) -> Result<ServerCategory, Response> {
    ServerCategory::parse(raw).ok_or_else(|| {
        (StatusCode::BAD_REQUEST, format!("Unknown category: {}", raw)).into_response()
    })
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    warn!("{}: {}", context, e);
    record_error("persistence", "servers");
    (StatusCode::INTERNAL_SERVER_ERROR, context.to_string()).into_response()
}

/// - GET /
/// - POST /
/// - GET /{id}
/// - PUT /{id}
/// - DELETE /{id}
/// - POST /{id}/test
pub fn server_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_servers).post(create_server))
        .route(
            "/{id}",
            get(get_server).put(update_server).delete(delete_server),
        )
        .route("/{id}/test", post(test_server))
}

async fn list_servers(State(state): State<ServerState>) -> Response {
    match state.settings.list_servers() {
        Ok(servers) => Json(servers).into_response(),
        Err(e) => internal_error("Failed to list servers", e),
    }
}

async fn get_server(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    match state.settings.get_server(&id) {
        Ok(Some(server)) => Json(server).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("Failed to read server", e),
    }
}

async fn create_server(
    State(state): State<ServerState>,
    Json(body): Json<CreateServerBody>,
) -> Response {
    let category = match parse_category(&body.category) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let envelope = match state.cipher.encrypt(&body.api_key) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Failed to encrypt API key: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encrypt API key")
                .into_response();
        }
    };

    let mut server = ManagedServer::new(body.name.trim(), body.base_url, envelope, category);
    server.enabled = body.enabled;
    if let Err(e) = server.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    match state.settings.get_server_by_name(&server.name) {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                format!("A server named {:?} already exists", server.name),
            )
                .into_response()
        }
        Ok(None) => {}
        Err(e) => return internal_error("Failed to create server", e),
    }

    match state.settings.create_server(&server) {
        Ok(()) => {
            info!("Created {} server {} ({})", server.category, server.name, server.id);
            (StatusCode::CREATED, Json(server)).into_response()
        }
        Err(e) => internal_error("Failed to create server", e),
    }
}

async fn update_server(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateServerBody>,
) -> Response {
    let mut server = match state.settings.get_server(&id) {
        Ok(Some(server)) => server,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return internal_error("Failed to read server", e),
    };

    if let Some(name) = body.name {
        server.name = name.trim().to_string();
    }
    if let Some(base_url) = body.base_url {
        server.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(raw) = body.category {
        server.category = match parse_category(&raw) {
            Ok(c) => c,
            Err(response) => return response,
        };
    }
    if let Some(enabled) = body.enabled {
        server.enabled = enabled;
    }
    if let Some(api_key) = body.api_key {
        server.encrypted_api_key = match state.cipher.encrypt(&api_key) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to encrypt API key: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encrypt API key")
                    .into_response();
            }
        };
    }
    if let Err(e) = server.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    match state.settings.get_server_by_name(&server.name) {
        Ok(Some(other)) if other.id != server.id => {
            return (
                StatusCode::CONFLICT,
                format!("A server named {:?} already exists", server.name),
            )
                .into_response()
        }
        Ok(_) => {}
        Err(e) => return internal_error("Failed to update server", e),
    }

    match state.settings.update_server(&server) {
        Ok(true) => Json(server).into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("Failed to update server", e),
    }
}

async fn delete_server(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    match state.settings.delete_server(&id) {
        Ok(true) => {
            info!("Deleted server {}", id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("Failed to delete server", e),
    }
}

/// POST /{id}/test - Check the server is reachable and the API key is accepted
async fn test_server(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    let server = match state.settings.get_server(&id) {
        Ok(Some(server)) => server,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return internal_error("Failed to read server", e),
    };

    let result = match state.clients.client_for(&server) {
        Ok(client) => client.test_connection().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(info) => Json(ConnectionTestResponse {
            success: true,
            info: Some(info),
            error: None,
        })
        .into_response(),
        Err(e) => {
            info!("Connection test failed for {}: {}", server.name, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ConnectionTestResponse {
                    success: false,
                    info: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

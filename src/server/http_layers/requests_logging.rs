//! Access logging for the HTTP API, plus per-route request metrics.
//!
//! Headers and JSON bodies are logged with API keys redacted.

use super::super::state::ServerState;
use crate::server::metrics::record_http_request;
use axum::extract::State;
use axum::{
    body::Body,
    http::{
        header::{HeaderMap, HeaderName, CONTENT_LENGTH},
        Request, Response, StatusCode,
    },
    middleware::Next,
    response::IntoResponse,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

const MAX_LOGGED_BODY_BYTES: usize = 1024;

const REDACTED: &str = "<redacted>";

const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "cookie", "x-api-key"];

const SENSITIVE_FIELDS: [&str; 2] = ["api_key", "encrypted_api_key"];

fn is_sensitive_header(name: &HeaderName) -> bool {
    SENSITIVE_HEADERS.contains(&name.as_str())
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields.iter_mut() {
                if SENSITIVE_FIELDS.contains(&key.as_str()) {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    redact_secrets(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}

/// Render a buffered body for the log. JSON is re-serialized with secrets masked.
fn loggable_body(bytes: &[u8]) -> String {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(mut json) => {
            redact_secrets(&mut json);
            json.to_string()
        }
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn log_headers(label: &str, headers: &HeaderMap) {
    info!("  {} headers:", label);
    for (name, value) in headers {
        let shown = if is_sensitive_header(name) {
            REDACTED
        } else {
            value.to_str().unwrap_or("<binary>")
        };
        info!("    {}: {}", name, shown);
    }
}

/// Log headers and body as `level` asks, handing back a body equivalent to `body`.
///
/// Bodies are only buffered when their declared length fits in the log.
async fn log_payload(
    level: &RequestsLoggingLevel,
    label: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Body, axum::Error> {
    if *level >= RequestsLoggingLevel::Headers {
        log_headers(label, headers);
    }
    if *level < RequestsLoggingLevel::Body {
        return Ok(body);
    }

    match content_length(headers) {
        None => {
            info!("  {} body: length not declared", label);
            Ok(body)
        }
        Some(length) if length > MAX_LOGGED_BODY_BYTES => {
            info!(
                "  {} body: too big to log ({:#})",
                label,
                byte_unit::Byte::from(length)
            );
            Ok(body)
        }
        Some(length) => {
            let bytes = axum::body::to_bytes(body, length).await?;
            info!("  {} body: {}", label, loggable_body(&bytes));
            Ok(Body::from(bytes))
        }
    }
}

fn internal_error() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, request.uri());
    }

    let (parts, body) = request.into_parts();
    let request = match log_payload(&level, "Request", &parts.headers, body).await {
        Ok(body) => Request::from_parts(parts, body),
        Err(err) => {
            error!("Failed to read request body for {} {}: {}", method, path, err);
            return internal_error();
        }
    };

    let (parts, body) = next.run(request).await.into_parts();
    let response = match log_payload(&level, "Response", &parts.headers, body).await {
        Ok(body) => Response::from_parts(parts, body),
        Err(err) => {
            error!("Failed to read response body for {} {}: {}", method, path, err);
            return internal_error();
        }
    };

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    if level > RequestsLoggingLevel::None {
        info!("<<< {} {} {} ({}ms)", status, method, path, elapsed.as_millis());
    }

    // Path only, without the query string
    record_http_request(&method, &path, status, elapsed);

    response
}

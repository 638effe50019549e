//! Activity log query route.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::activity_log::{LogEntry, LogEntryType, LogFilter};
use crate::server::metrics::record_error;
use crate::server::state::{GuardedActivityLog, ServerState};
use crate::settings_store::SearchKind;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    /// Comma separated entry types.
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub server: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub total_count: usize,
    pub limit: usize,
    pub offset: usize,
}

impl LogQuery {
    fn to_filter(&self) -> Result<LogFilter, String> {
        let mut types = Vec::new();
        if let Some(raw) = &self.entry_type {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                types.push(
                    LogEntryType::parse(part)
                        .ok_or_else(|| format!("Unknown log entry type: {}", part))?,
                );
            }
        }

        let category = match &self.category {
            Some(raw) => Some(
                SearchKind::parse(raw).ok_or_else(|| format!("Unknown category: {}", raw))?,
            ),
            None => None,
        };

        Ok(LogFilter {
            types,
            server_name: self.server.clone().filter(|s| !s.is_empty()),
            category,
            search: self.search.clone().filter(|s| !s.is_empty()),
            from: self.from,
            to: self.to,
        })
    }
}

pub fn log_routes() -> Router<ServerState> {
    Router::new().route("/", get(query_logs))
}

/// GET / - Newest entries first
async fn query_logs(
    State(activity_log): State<GuardedActivityLog>,
    Query(query): Query<LogQuery>,
) -> Response {
    let filter = match query.to_filter() {
        Ok(filter) => filter,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let result = activity_log
        .query(&filter, limit, query.offset)
        .and_then(|entries| Ok((entries, activity_log.count(&filter)?)));

    match result {
        Ok((entries, total_count)) => Json(LogPage {
            entries,
            total_count,
            limit,
            offset: query.offset,
        })
        .into_response(),
        Err(e) => {
            warn!("Failed to query activity log: {}", e);
            record_error("persistence", "logs");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to query activity log").into_response()
        }
    }
}

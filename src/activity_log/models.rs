use crate::settings_store::{SearchKind, ServerCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    CycleStart,
    CycleEnd,
    Search,
    Error,
    Detection,
}

impl LogEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEntryType::CycleStart => "cycle_start",
            LogEntryType::CycleEnd => "cycle_end",
            LogEntryType::Search => "search",
            LogEntryType::Error => "error",
            LogEntryType::Detection => "detection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cycle_start" => Some(LogEntryType::CycleStart),
            "cycle_end" => Some(LogEntryType::CycleEnd),
            "search" => Some(LogEntryType::Search),
            "error" => Some(LogEntryType::Error),
            "detection" => Some(LogEntryType::Detection),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted activity log entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: LogEntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_type: Option<ServerCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<SearchKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    pub message: String,
    pub is_manual: bool,
}

/// An entry waiting to be appended; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub entry_type: LogEntryType,
    pub server_name: Option<String>,
    pub server_type: Option<ServerCategory>,
    pub category: Option<SearchKind>,
    pub count: Option<i64>,
    pub message: String,
    pub is_manual: bool,
}

impl NewLogEntry {
    pub fn new(entry_type: LogEntryType, message: impl Into<String>) -> Self {
        Self {
            entry_type,
            server_name: None,
            server_type: None,
            category: None,
            count: None,
            message: message.into(),
            is_manual: false,
        }
    }

    pub fn with_server(mut self, name: impl Into<String>, server_type: ServerCategory) -> Self {
        self.server_name = Some(name.into());
        self.server_type = Some(server_type);
        self
    }

    pub fn with_category(mut self, category: SearchKind) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn manual(mut self, is_manual: bool) -> Self {
        self.is_manual = is_manual;
        self
    }
}

/// Query filters; every populated clause must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    /// Empty matches every type.
    pub types: Vec<LogEntryType>,
    pub server_name: Option<String>,
    pub category: Option<SearchKind>,
    /// Case-insensitive substring of the message.
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn with_types(mut self, types: Vec<LogEntryType>) -> Self {
        self.types = types;
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }
}

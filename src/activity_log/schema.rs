use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Append-only activity log
// =============================================================================

/// Timestamps are unix milliseconds so range filters and retention compare integers.
const ACTIVITY_LOG_TABLE_V1: Table = Table {
    name: "activity_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("entry_type", &SqlType::Text, non_null = true),
        sqlite_column!("server_name", &SqlType::Text),
        sqlite_column!("server_type", &SqlType::Text),
        sqlite_column!("category", &SqlType::Text),
        sqlite_column!("count", &SqlType::Integer),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_manual",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_activity_log_timestamp", "timestamp"),
        ("idx_activity_log_entry_type", "entry_type"),
        ("idx_activity_log_server_name", "server_name"),
    ],
};

pub const ACTIVITY_LOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[ACTIVITY_LOG_TABLE_V1],
    migration: None,
}];

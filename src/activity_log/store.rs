use super::models::{LogEntry, LogEntryType, LogFilter, NewLogEntry};
use super::schema::ACTIVITY_LOG_VERSIONED_SCHEMAS;
use crate::settings_store::{SearchKind, ServerCategory};
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable, append-only storage for activity log entries.
pub trait ActivityLogStore: Send + Sync {
    /// Persist an entry, assigning its id and timestamp.
    fn append(&self, entry: &NewLogEntry) -> Result<LogEntry>;
    /// Entries matching `filter`, newest first.
    fn query(&self, filter: &LogFilter, limit: usize, offset: usize) -> Result<Vec<LogEntry>>;
    fn count(&self, filter: &LogFilter) -> Result<usize>;
    /// Delete entries older than `cutoff`. Returns the number of rows removed.
    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

const ENTRY_COLUMNS: &str =
    "id, timestamp, entry_type, server_name, server_type, category, count, message, is_manual";

pub struct SqliteActivityLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActivityLogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, ACTIVITY_LOG_VERSIONED_SCHEMAS, "activity log")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ACTIVITY_LOG_VERSIONED_SCHEMAS
            .last()
            .context("No activity log schema defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
        let type_str: String = row.get("entry_type")?;
        let entry_type = LogEntryType::parse(&type_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown log entry type {:?}", type_str).into(),
            )
        })?;
        let server_type: Option<String> = row.get("server_type")?;
        let category: Option<String> = row.get("category")?;

        Ok(LogEntry {
            id: row.get("id")?,
            timestamp: Self::millis_to_datetime(row.get("timestamp")?),
            entry_type,
            server_name: row.get("server_name")?,
            server_type: server_type.as_deref().and_then(ServerCategory::parse),
            category: category.as_deref().and_then(SearchKind::parse),
            count: row.get("count")?,
            message: row.get("message")?,
            is_manual: row.get::<_, i64>("is_manual")? != 0,
        })
    }

    /// Build the WHERE clause and its bound values for a filter.
    fn where_clause(filter: &LogFilter) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !filter.types.is_empty() {
            let placeholders = filter
                .types
                .iter()
                .map(|t| {
                    values.push(Value::Text(t.as_str().to_string()));
                    format!("?{}", values.len())
                })
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("entry_type IN ({})", placeholders));
        }
        if let Some(server_name) = &filter.server_name {
            values.push(Value::Text(server_name.clone()));
            clauses.push(format!("server_name = ?{}", values.len()));
        }
        if let Some(category) = filter.category {
            values.push(Value::Text(category.as_str().to_string()));
            clauses.push(format!("category = ?{}", values.len()));
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            values.push(Value::Text(search.to_lowercase()));
            clauses.push(format!("instr(lower(message), ?{}) > 0", values.len()));
        }
        if let Some(from) = filter.from {
            values.push(Value::Integer(from.timestamp_millis()));
            clauses.push(format!("timestamp >= ?{}", values.len()));
        }
        if let Some(to) = filter.to {
            values.push(Value::Integer(to.timestamp_millis()));
            clauses.push(format!("timestamp <= ?{}", values.len()));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

impl ActivityLogStore for SqliteActivityLogStore {
    fn append(&self, entry: &NewLogEntry) -> Result<LogEntry> {
        let timestamp = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO activity_log (timestamp, entry_type, server_name, server_type, category, count, message, is_manual)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                timestamp.timestamp_millis(),
                entry.entry_type.as_str(),
                entry.server_name,
                entry.server_type.map(|t| t.as_str()),
                entry.category.map(|c| c.as_str()),
                entry.count,
                entry.message,
                entry.is_manual as i64,
            ],
        )
        .context("Failed to append activity log entry")?;

        Ok(LogEntry {
            id: conn.last_insert_rowid(),
            timestamp: Self::millis_to_datetime(timestamp.timestamp_millis()),
            entry_type: entry.entry_type,
            server_name: entry.server_name.clone(),
            server_type: entry.server_type,
            category: entry.category,
            count: entry.count,
            message: entry.message.clone(),
            is_manual: entry.is_manual,
        })
    }

    fn query(&self, filter: &LogFilter, limit: usize, offset: usize) -> Result<Vec<LogEntry>> {
        let (where_sql, mut values) = Self::where_clause(filter);
        values.push(Value::Integer(limit as i64));
        let limit_idx = values.len();
        values.push(Value::Integer(offset as i64));
        let offset_idx = values.len();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM activity_log{} ORDER BY timestamp DESC, id DESC LIMIT ?{} OFFSET ?{}",
            ENTRY_COLUMNS, where_sql, limit_idx, offset_idx
        ))?;
        let entries = stmt
            .query_map(params_from_iter(values), Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn count(&self, filter: &LogFilter) -> Result<usize> {
        let (where_sql, values) = Self::where_clause(filter);
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM activity_log{}", where_sql),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM activity_log WHERE timestamp < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn seed(store: &SqliteActivityLogStore) {
        let entries = [
            NewLogEntry::new(LogEntryType::CycleStart, "Manual cycle started").manual(true),
            NewLogEntry::new(LogEntryType::Detection, "Found 4 missing, 1 cutoff")
                .with_server("movies", ServerCategory::MovieManager)
                .with_count(5),
            NewLogEntry::new(LogEntryType::Search, "Triggered 3 missing searches")
                .with_server("movies", ServerCategory::MovieManager)
                .with_category(SearchKind::Missing)
                .with_count(3),
            NewLogEntry::new(LogEntryType::Error, "Detection failed for shows: timeout")
                .with_server("shows", ServerCategory::EpisodeManager),
            NewLogEntry::new(LogEntryType::CycleEnd, "Cycle completed with 1 error").manual(true),
        ];
        for entry in &entries {
            store.append(entry).unwrap();
        }
    }

    #[test]
    fn append_assigns_unique_increasing_ids() {
        let store = SqliteActivityLogStore::in_memory().unwrap();
        let a = store
            .append(&NewLogEntry::new(LogEntryType::CycleStart, "a"))
            .unwrap();
        let b = store
            .append(&NewLogEntry::new(LogEntryType::CycleEnd, "b"))
            .unwrap();
        assert!(b.id > a.id);
        assert!(b.timestamp >= a.timestamp);
    }

    #[test]
    fn query_returns_newest_first() {
        let store = SqliteActivityLogStore::in_memory().unwrap();
        seed(&store);

        let entries = store.query(&LogFilter::default(), 100, 0).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].entry_type, LogEntryType::CycleEnd);
        assert_eq!(entries[4].entry_type, LogEntryType::CycleStart);
        assert!(entries[0].is_manual);
    }

    #[test]
    fn filters_compose_with_and() {
        let store = SqliteActivityLogStore::in_memory().unwrap();
        seed(&store);

        let by_server = LogFilter {
            server_name: Some("movies".into()),
            ..Default::default()
        };
        assert_eq!(store.count(&by_server).unwrap(), 2);

        let by_server_and_type = LogFilter {
            server_name: Some("movies".into()),
            types: vec![LogEntryType::Search],
            ..Default::default()
        };
        let entries = store.query(&by_server_and_type, 10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, Some(SearchKind::Missing));
        assert_eq!(entries[0].count, Some(3));

        let by_category = LogFilter {
            category: Some(SearchKind::Cutoff),
            ..Default::default()
        };
        assert_eq!(store.count(&by_category).unwrap(), 0);

        let multi_type =
            LogFilter::default().with_types(vec![LogEntryType::CycleStart, LogEntryType::CycleEnd]);
        assert_eq!(store.count(&multi_type).unwrap(), 2);
    }

    #[test]
    fn message_search_is_case_insensitive() {
        let store = SqliteActivityLogStore::in_memory().unwrap();
        seed(&store);

        let filter = LogFilter {
            search: Some("DETECTION FAILED".into()),
            ..Default::default()
        };
        let entries = store.query(&filter, 10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].server_type, Some(ServerCategory::EpisodeManager));
    }

    #[test]
    fn date_range_and_pagination() {
        let store = SqliteActivityLogStore::in_memory().unwrap();
        seed(&store);

        let future = LogFilter::default().since(Utc::now() + Duration::hours(1));
        assert_eq!(store.count(&future).unwrap(), 0);

        let past = LogFilter {
            from: Some(Utc::now() - Duration::hours(1)),
            to: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(store.count(&past).unwrap(), 5);

        let page = store.query(&LogFilter::default(), 2, 3).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].entry_type, LogEntryType::CycleStart);
    }

    #[test]
    fn prune_removes_only_old_entries() {
        let store = SqliteActivityLogStore::in_memory().unwrap();
        seed(&store);
        {
            let conn = store.conn.lock().unwrap();
            let old = (Utc::now() - Duration::days(40)).timestamp_millis();
            conn.execute(
                "UPDATE activity_log SET timestamp = ?1 WHERE entry_type = 'cycle_start'",
                params![old],
            )
            .unwrap();
        }

        let deleted = store
            .prune_older_than(Utc::now() - Duration::days(30))
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count(&LogFilter::default()).unwrap(), 4);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.db");
        {
            let store = SqliteActivityLogStore::new(&path).unwrap();
            seed(&store);
        }
        let store = SqliteActivityLogStore::new(&path).unwrap();
        assert_eq!(store.count(&LogFilter::default()).unwrap(), 5);
    }
}

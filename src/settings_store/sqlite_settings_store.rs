use super::models::{ManagedServer, RateLimitConfig, ScheduleConfig, ServerCategory};
use super::schema::SETTINGS_VERSIONED_SCHEMAS;
use super::SettingsStore;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEDULE_CONFIG_KEY: &str = "schedule_config";
const RATE_LIMITS_KEY: &str = "rate_limits";

const SERVER_COLUMNS: &str = "id, name, base_url, encrypted_api_key, category, enabled, created_at";

pub struct SqliteSettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettingsStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, SETTINGS_VERSIONED_SCHEMAS, "settings")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        SETTINGS_VERSIONED_SCHEMAS
            .last()
            .context("No settings schema defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn read_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw)
                    .with_context(|| format!("Malformed value for setting {}", key))?,
            )),
            None => Ok(None),
        }
    }

    fn write_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let now = Self::format_datetime(&Utc::now());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, json, now],
        )?;
        Ok(())
    }

    fn row_to_server(row: &rusqlite::Row) -> rusqlite::Result<ManagedServer> {
        let category_str: String = row.get("category")?;
        let category = ServerCategory::parse(&category_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                format!("unknown server category {:?}", category_str).into(),
            )
        })?;
        let created_at_str: String = row.get("created_at")?;

        Ok(ManagedServer {
            id: row.get("id")?,
            name: row.get("name")?,
            base_url: row.get("base_url")?,
            encrypted_api_key: row.get("encrypted_api_key")?,
            category,
            enabled: row.get::<_, i64>("enabled")? != 0,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn query_one_server(&self, where_clause: &str, value: &str) -> Result<Option<ManagedServer>> {
        let conn = self.conn.lock().unwrap();
        let server = conn
            .query_row(
                &format!(
                    "SELECT {} FROM managed_servers WHERE {} = ?1",
                    SERVER_COLUMNS, where_clause
                ),
                params![value],
                Self::row_to_server,
            )
            .optional()?;
        Ok(server)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get_schedule_config(&self) -> Result<ScheduleConfig> {
        Ok(self
            .read_setting(SCHEDULE_CONFIG_KEY)?
            .unwrap_or_default())
    }

    fn set_schedule_config(&self, config: &ScheduleConfig) -> Result<()> {
        config.validate()?;
        self.write_setting(SCHEDULE_CONFIG_KEY, config)
    }

    fn get_rate_limits(&self) -> Result<RateLimitConfig> {
        Ok(self.read_setting(RATE_LIMITS_KEY)?.unwrap_or_default())
    }

    fn set_rate_limits(&self, limits: &RateLimitConfig) -> Result<()> {
        limits.validate()?;
        self.write_setting(RATE_LIMITS_KEY, limits)
    }

    fn seed_defaults(&self, schedule: &ScheduleConfig, limits: &RateLimitConfig) -> Result<()> {
        if self
            .read_setting::<ScheduleConfig>(SCHEDULE_CONFIG_KEY)?
            .is_none()
        {
            self.set_schedule_config(schedule)?;
        }
        if self.read_setting::<RateLimitConfig>(RATE_LIMITS_KEY)?.is_none() {
            self.set_rate_limits(limits)?;
        }
        Ok(())
    }

    fn list_servers(&self) -> Result<Vec<ManagedServer>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM managed_servers ORDER BY name ASC",
            SERVER_COLUMNS
        ))?;
        let servers = stmt
            .query_map([], Self::row_to_server)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(servers)
    }

    fn get_server(&self, id: &str) -> Result<Option<ManagedServer>> {
        self.query_one_server("id", id)
    }

    fn get_server_by_name(&self, name: &str) -> Result<Option<ManagedServer>> {
        self.query_one_server("name", name)
    }

    fn create_server(&self, server: &ManagedServer) -> Result<()> {
        server.validate()?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO managed_servers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                SERVER_COLUMNS
            ),
            params![
                server.id,
                server.name,
                server.base_url,
                server.encrypted_api_key,
                server.category.as_str(),
                server.enabled as i64,
                Self::format_datetime(&server.created_at),
            ],
        )
        .with_context(|| format!("Failed to insert server {}", server.name))?;
        Ok(())
    }

    fn update_server(&self, server: &ManagedServer) -> Result<bool> {
        server.validate()?;
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE managed_servers
             SET name = ?2, base_url = ?3, encrypted_api_key = ?4, category = ?5, enabled = ?6
             WHERE id = ?1",
            params![
                server.id,
                server.name,
                server.base_url,
                server.encrypted_api_key,
                server.category.as_str(),
                server.enabled as i64,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_server(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM managed_servers WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

//! Durable SQLite key-value backend
//!
//! A single `kv` table with embedded migrations managed via
//! PRAGMA user_version. WAL journaling keeps the write path fast enough to
//! run inside unload-time session finalization.

use crate::error::{Error, Result};
use crate::storage::KvStore;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// Schema version this build writes
pub const SCHEMA_VERSION: i32 = 1;

/// Migrations applied in order; position + 1 is the resulting version
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial key-value schema
    r#"
    CREATE TABLE IF NOT EXISTS kv (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    "#,
];

fn read_err(e: impl std::fmt::Display) -> Error {
    Error::StorageRead(e.to_string())
}

fn write_err(e: impl std::fmt::Display) -> Error {
    Error::StorageWrite(e.to_string())
}

/// Durable key-value store backed by SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(read_err)?;

        // WAL mode for concurrent readers, NORMAL sync keeps unload writes fast
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .map_err(read_err)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(read_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run all pending migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let current_version: i32 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap_or(0);

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                tracing::info!(version, "Running storage migration");
                conn.execute_batch(migration).map_err(read_err)?;
                conn.execute(&format!("PRAGMA user_version = {}", version), [])
                    .map_err(read_err)?;
            }
        }

        Ok(())
    }

    /// Current schema version recorded in the database
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock().unwrap();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .map_err(read_err)?;
        Ok(version)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(read_err)?;

        match raw {
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .map_err(|e| Error::StorageRead(format!("corrupt value for {}: {}", key, e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value).map_err(write_err)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, text, Utc::now().to_rfc3339()],
        )
        .map_err(write_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();

        let value = json!({
            "total_sessions": 3,
            "daily_stats": { "2024-06-15": { "sessions": 1 } },
            "sites": ["youtube.com", "vimeo.com"]
        });
        store.set("k", &value).unwrap();

        let loaded = store.get("k").unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[test]
    fn test_get_absent_key_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", &json!({"count": 1})).unwrap();
        store.set("k", &json!({"count": 2})).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!({"count": 2})));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", &json!(1)).unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        // Removing again must not error
        store.remove("k").unwrap();
    }

    #[test]
    fn test_migrations_record_schema_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupt_value_maps_to_storage_read() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('bad', 'not json', '')",
                [],
            )
            .unwrap();
        }

        match store.get("bad") {
            Err(Error::StorageRead(msg)) => assert!(msg.contains("bad")),
            other => panic!("expected StorageRead, got {:?}", other),
        }
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/analytics.db");
        let store = SqliteStore::open(&path).unwrap();
        store.set("k", &json!(true)).unwrap();
        assert!(path.exists());
    }
}

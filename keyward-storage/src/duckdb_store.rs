//! DuckDB-backed key/value store, one table per local profile.

use crate::error::{StorageError, StorageResult};
use crate::KeyValueStore;
use chrono::Utc;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistent store for a single profile.
///
/// Several profiles may share one database file; each gets its own
/// `profile_<id>_kv` table.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

/// Sanitize a profile ID for use in SQL identifiers (table names).
/// Replaces any character that isn't alphanumeric or underscore with '_'.
fn sanitize_for_sql(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

impl DuckDbStore {
    /// Opens or creates the store for `profile` in the database at `path`.
    pub fn open(path: &Path, profile: &str) -> StorageResult<Self> {
        let conn = crate::open_duckdb_with_wal_recovery(path, "64MB", 1)?;
        Self::with_connection(Arc::new(Mutex::new(conn)), profile)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(profile: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(Arc::new(Mutex::new(conn)), profile)
    }

    /// Opens the store for `profile` on an existing shared connection.
    pub fn with_connection(conn: Arc<Mutex<Connection>>, profile: &str) -> StorageResult<Self> {
        let store = Self {
            table: format!("profile_{}_kv", sanitize_for_sql(profile)),
            conn,
        };
        store.ensure_table()?;
        debug!(table = %store.table, "opened profile store");
        Ok(store)
    }

    fn ensure_table(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key VARCHAR PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at BIGINT NOT NULL
            );",
            self.table
        ))?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }
}

impl KeyValueStore for DuckDbStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("SELECT value FROM {} WHERE key = ?", self.table),
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?, ?, ?)",
                self.table
            ),
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?", self.table),
            params![key],
        )?;
        Ok(())
    }
}

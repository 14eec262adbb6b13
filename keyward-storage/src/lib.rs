//! Local secure store for Keyward.
//!
//! The store is deliberately dumb: it persists opaque byte values under
//! string keys and never looks inside them. Everything written here by the
//! key-custody layer is already passphrase-wrapped, so the store itself is
//! treated as untrusted.
//!
//! # Backends
//!
//! - [`DuckDbStore`]: one table per local profile in a DuckDB file, with
//!   stale WAL recovery on open
//! - [`MemoryStore`]: process-local map, for tests and ephemeral profiles

mod duckdb_store;
mod error;
mod memory_store;

pub use duckdb_store::DuckDbStore;
pub use error::{StorageError, StorageResult};
pub use memory_store::MemoryStore;

/// Byte-valued key/value persistence.
///
/// `put` replaces any existing value atomically; readers never observe a
/// partially written value.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Open a DuckDB connection with stale WAL recovery and resource limits.
///
/// If the initial open fails and a `.wal` file exists alongside the database,
/// it is removed and the open is retried once. This handles the common case
/// where an unclean shutdown leaves a WAL file that prevents reopening.
pub fn open_duckdb_with_wal_recovery(
    path: &std::path::Path,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<duckdb::Connection> {
    let conn = match duckdb::Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                tracing::warn!(
                    wal = %wal_path.display(),
                    "DuckDB open failed, removing stale WAL and retrying"
                );
                std::fs::remove_file(&wal_path)?;
                let c = duckdb::Connection::open(path)?;
                apply_resource_limits(&c, memory_limit, threads)?;
                return Ok(c);
            }
            return Err(first_err.into());
        }
    };
    apply_resource_limits(&conn, memory_limit, threads)?;
    Ok(conn)
}

/// Apply memory and thread limits to a DuckDB connection.
fn apply_resource_limits(
    conn: &duckdb::Connection,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{memory_limit}'; PRAGMA threads={threads};"
    ))?;
    Ok(())
}

//! [`Store`] -- the SQLite-backed connection owner (§2 "Store", §5).
//!
//! Two variants exist per §6.4: memory-backed (the database and its
//! contents live only as long as the `Store` does) and file-backed
//! (durable, WAL-journalled). Every public operation in this crate acquires
//! the store's mutex for the duration of its SQL work; the mutex is the
//! engine's single point of serialization (§5).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::schema;

/// Which of the two storage modes a [`Store`] was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    File,
}

/// Owns the single SQLite connection behind a fairness-preserving mutex
/// (§5, §9). Disposing the store (explicitly, or by drop) releases the
/// connection; any in-memory contents are lost at that point.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
    mode: StoreMode,
    disposed: AtomicBool,
}

impl Store {
    /// Opens an in-process, shared-memory-backed database. Contents live
    /// only as long as this `Store` value does.
    pub fn open_memory() -> Result<Self> {
        debug!("opening in-memory store");
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("failed to open in-memory db: {e}")))?;
        let store = Self { conn: Mutex::new(conn), mode: StoreMode::Memory, disposed: AtomicBool::new(false) };
        store.configure_connection()?;
        store.init_schema()?;
        info!("store opened (memory)");
        Ok(store)
    }

    /// Opens (or creates) a durable, WAL-journalled database at `path`.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, "opening file-backed store");
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Connection(format!("failed to open {}: {e}", path.display())))?;
        let store = Self { conn: Mutex::new(conn), mode: StoreMode::File, disposed: AtomicBool::new(false) };
        store.configure_connection()?;
        store.init_schema()?;
        info!("store opened (file)");
        Ok(store)
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    fn configure_connection(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))?;
        if self.mode == StoreMode::File {
            conn.execute_batch("PRAGMA journal_mode = WAL;")
                .map_err(|e| StorageError::Connection(format!("failed to set WAL mode: {e}")))?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(|e| StorageError::Connection(format!("failed to set pragmas: {e}")))?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))?;

        let version: std::result::Result<i32, _> = conn.query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| {
                let v: String = row.get(0)?;
                Ok(v.parse::<i32>().unwrap_or(0))
            },
        );
        if let Ok(v) = version {
            if v >= schema::CURRENT_SCHEMA_VERSION {
                debug!(version = v, "catalog schema already current");
                return Ok(());
            }
        }

        for stmt in schema::CATALOG_SCHEMA {
            conn.execute_batch(stmt).map_err(StorageError::Query)?;
        }
        conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES ('schema_version', ?1)",
            rusqlite::params![schema::CURRENT_SCHEMA_VERSION.to_string()],
        )
        .map_err(StorageError::Query)?;

        debug!(version = schema::CURRENT_SCHEMA_VERSION, "catalog schema initialized");
        Ok(())
    }

    /// Acquires the connection lock, failing `Disposed` if [`Store::dispose`]
    /// was already called. Every operation module funnels through this.
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StorageError::Disposed);
        }
        self.conn.lock().map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))
    }

    /// Marks the store disposed. The connection itself is released when the
    /// `Store` value is dropped; after this call every operation fails
    /// `Disposed` (§5).
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        info!("store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("mode", &self.mode).field("disposed", &self.is_disposed()).finish()
    }
}

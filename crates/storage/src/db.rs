// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database handle and idempotent schema creation

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS event_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    source TEXT NOT NULL DEFAULT '',
    idempotency_key TEXT NOT NULL DEFAULT '',
    def_id TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_ledger_type_time
    ON event_ledger(event_type, timestamp);
CREATE INDEX IF NOT EXISTS idx_ledger_key_type
    ON event_ledger(idempotency_key, event_type);
CREATE INDEX IF NOT EXISTS idx_ledger_def_completed
    ON event_ledger(def_id, event_type, timestamp)
    WHERE def_id <> '' AND event_type = 'action_completed';
CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_unique_completion
    ON event_ledger(idempotency_key)
    WHERE idempotency_key <> '' AND event_type = 'action_completed';

CREATE TABLE IF NOT EXISTS resource_state (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    payload TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (kind, id)
);
CREATE INDEX IF NOT EXISTS idx_resource_state_kind ON resource_state(kind);

CREATE TABLE IF NOT EXISTS schedule_definitions (
    id TEXT PRIMARY KEY,
    time_expr TEXT NOT NULL,
    action_name TEXT NOT NULL,
    action_args TEXT NOT NULL DEFAULT 'null',
    tag TEXT NOT NULL DEFAULT '',
    misfire_policy TEXT NOT NULL DEFAULT 'run_latest',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS schedule_occurrences (
    def_id TEXT NOT NULL,
    occurrence_id TEXT NOT NULL,
    run_at INTEGER NOT NULL,
    is_next INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (def_id, occurrence_id),
    FOREIGN KEY (def_id) REFERENCES schedule_definitions(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_occurrences_run_at ON schedule_occurrences(run_at);
CREATE INDEX IF NOT EXISTS idx_occurrences_is_next ON schedule_occurrences(is_next);

CREATE TABLE IF NOT EXISTS geocache (
    query TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv_store (
    bucket TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (bucket, key)
);
CREATE INDEX IF NOT EXISTS idx_kv_bucket ON kv_store(bucket);
CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv_store(expires_at)
    WHERE expires_at IS NOT NULL;
";

/// Shared handle to the daemon's SQLite database.
///
/// A single connection behind a mutex; WAL mode keeps readers cheap and
/// all writers in the process serialize here. Accessor facades
/// ([`crate::Ledger`], [`crate::ResourceStore`], ...) clone this handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("database opened, schema ensured");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Run `f` with the locked connection.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only action ledger.
//!
//! The unique partial index on `(idempotency_key)` for completed rows
//! makes duplicate completions collapse at the insert: first writer wins,
//! later writers see `false` from [`Ledger::append`].

use crate::db::{Database, StorageError};
use lume_core::{LedgerEntry, LedgerEntryType};
use rusqlite::params;
use std::str::FromStr;

/// One append, fully specified.
pub struct AppendParams<'a> {
    pub entry_type: LedgerEntryType,
    /// Unix seconds, UTC
    pub timestamp: i64,
    pub payload: &'a serde_json::Value,
    pub source: &'a str,
    pub idempotency_key: &'a str,
    pub def_id: &'a str,
}

/// Accessor for the `event_ledger` table.
#[derive(Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert one row. Returns whether a row was actually written; a
    /// duplicate completion for a non-empty key is silently collapsed
    /// and reports `false`.
    pub fn append(&self, params: AppendParams<'_>) -> Result<bool, StorageError> {
        let payload = serde_json::to_string(params.payload)?;
        self.db.with(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO event_ledger
                     (event_type, timestamp, payload, source, idempotency_key, def_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    params.entry_type.as_str(),
                    params.timestamp,
                    payload,
                    params.source,
                    params.idempotency_key,
                    params.def_id,
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Whether a completion exists for `key`. Always false for empty keys.
    pub fn has_completed(&self, key: &str) -> Result<bool, StorageError> {
        if key.is_empty() {
            return Ok(false);
        }
        self.db.with(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM event_ledger
                     WHERE idempotency_key = ?1 AND event_type = 'action_completed')",
                params![key],
                |row| row.get::<_, bool>(0),
            )?;
            Ok(exists)
        })
    }

    /// Timestamp of the most recent completion recorded for a schedule
    /// definition, used by misfire recovery.
    pub fn last_completed_for_def(&self, def_id: &str) -> Result<Option<i64>, StorageError> {
        self.db.with(|conn| {
            let ts = conn.query_row(
                "SELECT MAX(timestamp) FROM event_ledger
                 WHERE def_id = ?1 AND event_type = 'action_completed'",
                params![def_id],
                |row| row.get::<_, Option<i64>>(0),
            )?;
            Ok(ts)
        })
    }

    /// Started entries whose key never completed. Replayed at boot.
    pub fn orphaned_started(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_type, timestamp, payload, source, idempotency_key, def_id
                 FROM event_ledger s
                 WHERE s.event_type = 'action_started'
                   AND s.idempotency_key <> ''
                   AND NOT EXISTS (
                       SELECT 1 FROM event_ledger c
                       WHERE c.event_type = 'action_completed'
                         AND c.idempotency_key = s.idempotency_key)
                 ORDER BY s.id",
            )?;
            let rows = stmt.query_map([], row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }

    /// Delete entries with `timestamp < cutoff`. Returns rows removed.
    pub fn delete_older_than(&self, cutoff: i64) -> Result<usize, StorageError> {
        self.db.with(|conn| {
            let n = conn.execute(
                "DELETE FROM event_ledger WHERE timestamp < ?1",
                params![cutoff],
            )?;
            Ok(n)
        })
    }

    /// All entries recorded for an idempotency key, oldest first.
    pub fn entries_for_key(&self, key: &str) -> Result<Vec<LedgerEntry>, StorageError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_type, timestamp, payload, source, idempotency_key, def_id
                 FROM event_ledger WHERE idempotency_key = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![key], row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
    }

    /// Count of rows with the given entry type.
    pub fn count_by_type(&self, entry_type: LedgerEntryType) -> Result<i64, StorageError> {
        self.db.with(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM event_ledger WHERE event_type = ?1",
                params![entry_type.as_str()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let type_str: String = row.get(1)?;
    let payload_str: String = row.get(3)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        entry_type: LedgerEntryType::from_str(&type_str)
            .unwrap_or(LedgerEntryType::ActionFailed),
        timestamp: row.get(2)?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        source: row.get(4)?,
        idempotency_key: row.get(5)?,
        def_id: row.get(6)?,
    })
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;

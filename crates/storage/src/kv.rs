// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script-facing key-value buckets.
//!
//! Two flavors with the same surface: [`KvStore`] persists to SQLite,
//! [`MemoryKv`] lives and dies with the process. Expired rows read as
//! misses immediately; the purge sweep only reclaims space.

use crate::db::{Database, StorageError};
use lume_core::Value;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// SQLite-backed KV accessor.
#[derive(Clone)]
pub struct KvStore {
    db: Database,
}

impl KvStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn put(
        &self,
        bucket: &str,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
        now: i64,
    ) -> Result<(), StorageError> {
        let text = serde_json::to_string(value)?;
        let expires_at = ttl.map(|d| now + d.as_secs() as i64);
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO kv_store (bucket, key, value, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(bucket, key) DO UPDATE SET
                     value = excluded.value,
                     expires_at = excluded.expires_at,
                     updated_at = excluded.updated_at",
                params![bucket, key, text, expires_at, now],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, bucket: &str, key: &str, now: i64) -> Result<Option<Value>, StorageError> {
        self.db.with(|conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_store
                     WHERE bucket = ?1 AND key = ?2
                       AND (expires_at IS NULL OR expires_at > ?3)",
                    params![bucket, key, now],
                    |row| row.get(0),
                )
                .optional()?;
            match row {
                Some(text) => Ok(Some(serde_json::from_str(&text)?)),
                None => Ok(None),
            }
        })
    }

    pub fn delete(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        self.db.with(|conn| {
            let n = conn.execute(
                "DELETE FROM kv_store WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
            )?;
            Ok(n > 0)
        })
    }

    /// Live keys in a bucket.
    pub fn keys(&self, bucket: &str, now: i64) -> Result<Vec<String>, StorageError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM kv_store
                 WHERE bucket = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![bucket, now], |row| row.get(0))?;
            let mut keys = Vec::new();
            for row in rows {
                keys.push(row?);
            }
            Ok(keys)
        })
    }

    /// Reclaim expired rows. Returns rows removed.
    pub fn purge_expired(&self, now: i64) -> Result<usize, StorageError> {
        self.db.with(|conn| {
            let n = conn.execute(
                "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(n)
        })
    }
}

/// Non-durable KV with the same surface as [`KvStore`].
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<(String, String), MemoryEntry>>>,
}

struct MemoryEntry {
    value: Value,
    expires_at: Option<i64>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, value: Value, ttl: Option<Duration>, now: i64) {
        let expires_at = ttl.map(|d| now + d.as_secs() as i64);
        self.entries
            .lock()
            .insert((bucket.to_string(), key.to_string()), MemoryEntry { value, expires_at });
    }

    pub fn get(&self, bucket: &str, key: &str, now: i64) -> Option<Value> {
        let entries = self.entries.lock();
        let entry = entries.get(&(bucket.to_string(), key.to_string()))?;
        match entry.expires_at {
            Some(at) if at <= now => None,
            _ => Some(entry.value.clone()),
        }
    }

    pub fn delete(&self, bucket: &str, key: &str) -> bool {
        self.entries.lock().remove(&(bucket.to_string(), key.to_string())).is_some()
    }

    pub fn keys(&self, bucket: &str, now: i64) -> Vec<String> {
        let entries = self.entries.lock();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|((b, _), e)| b == bucket && e.expires_at.map_or(true, |at| at > now))
            .map(|((_, k), _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn purge_expired(&self, now: i64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at.map_or(true, |at| at > now));
        before - entries.len()
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;

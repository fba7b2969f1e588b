// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned per-(kind, id) JSON state.
//!
//! Versions increase strictly on every write, which is what lets the
//! reconciliation orchestrator ask "what changed since the versions I
//! last saw" with a plain scan.

use crate::db::{Database, StorageError};
use lume_core::Kind;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Accessor for the `resource_state` table.
#[derive(Clone)]
pub struct ResourceStore {
    db: Database,
}

impl ResourceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Read `(payload, version)`; `None` on miss.
    pub fn get(&self, kind: Kind, id: &str) -> Result<Option<(String, i64)>, StorageError> {
        self.db.with(|conn| {
            let row = conn
                .query_row(
                    "SELECT payload, version FROM resource_state WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Upsert; version becomes 1 on insert, old+1 on update. Returns the
    /// new version.
    pub fn set(&self, kind: Kind, id: &str, payload: &str, now: i64) -> Result<i64, StorageError> {
        self.db.with(|conn| {
            let version = conn.query_row(
                "INSERT INTO resource_state (kind, id, payload, version, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT(kind, id) DO UPDATE SET
                     payload = excluded.payload,
                     version = resource_state.version + 1,
                     updated_at = excluded.updated_at
                 RETURNING version",
                params![kind.as_str(), id, payload, now],
                |row| row.get(0),
            )?;
            Ok(version)
        })
    }

    /// IDs of the kind whose stored version exceeds the caller's
    /// last-seen value, including rows the caller has never seen.
    pub fn get_dirty(
        &self,
        kind: Kind,
        last_versions: &HashMap<String, i64>,
    ) -> Result<Vec<String>, StorageError> {
        self.db.with(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, version FROM resource_state WHERE kind = ?1")?;
            let rows = stmt.query_map(params![kind.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut dirty = Vec::new();
            for row in rows {
                let (id, version) = row?;
                if version > last_versions.get(&id).copied().unwrap_or(0) {
                    dirty.push(id);
                }
            }
            Ok(dirty)
        })
    }

    /// All rows of a kind as `(id, payload, version)`.
    pub fn get_all(&self, kind: Kind) -> Result<Vec<(String, String, i64)>, StorageError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload, version FROM resource_state WHERE kind = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![kind.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    pub fn delete(&self, kind: Kind, id: &str) -> Result<bool, StorageError> {
        self.db.with(|conn| {
            let n = conn.execute(
                "DELETE FROM resource_state WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )?;
            Ok(n > 0)
        })
    }

    /// Remove all rows of one kind, or every row when `kind` is `None`.
    /// Used by the `--reset-state` startup path.
    pub fn clear(&self, kind: Option<Kind>) -> Result<usize, StorageError> {
        self.db.with(|conn| {
            let n = match kind {
                Some(k) => conn.execute(
                    "DELETE FROM resource_state WHERE kind = ?1",
                    params![k.as_str()],
                )?,
                None => conn.execute("DELETE FROM resource_state", [])?,
            };
            Ok(n)
        })
    }

    /// Typed view over one kind.
    pub fn typed<T>(&self, kind: Kind) -> TypedStore<T> {
        TypedStore { store: self.clone(), kind, _marker: PhantomData }
    }
}

/// JSON-typed wrapper over [`ResourceStore`] for a single kind.
pub struct TypedStore<T> {
    store: ResourceStore,
    kind: Kind,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedStore<T> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), kind: self.kind, _marker: PhantomData }
    }
}

impl<T> TypedStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn get(&self, id: &str) -> Result<Option<(T, i64)>, StorageError> {
        match self.store.get(self.kind, id)? {
            Some((payload, version)) => Ok(Some((serde_json::from_str(&payload)?, version))),
            None => Ok(None),
        }
    }

    pub fn set(&self, id: &str, value: &T, now: i64) -> Result<i64, StorageError> {
        let payload = serde_json::to_string(value)?;
        self.store.set(self.kind, id, &payload, now)
    }

    /// Read-modify-write; the row defaults to `T::default()` when absent.
    ///
    /// Not linearizable against concurrent writers of the same row.
    /// Callers relying on monotonic merging serialize externally; in
    /// practice all updates go through the script host's single worker.
    pub fn update(
        &self,
        id: &str,
        now: i64,
        f: impl FnOnce(T) -> T,
    ) -> Result<i64, StorageError> {
        let current = self.get(id)?.map(|(v, _)| v).unwrap_or_default();
        self.set(id, &f(current), now)
    }

    pub fn get_dirty(
        &self,
        last_versions: &HashMap<String, i64>,
    ) -> Result<Vec<String>, StorageError> {
        self.store.get_dirty(self.kind, last_versions)
    }

    pub fn get_all(&self) -> Result<Vec<(String, T, i64)>, StorageError> {
        let rows = self.store.get_all(self.kind)?;
        let mut out = Vec::with_capacity(rows.len());
        for (id, payload, version) in rows {
            out.push((id, serde_json::from_str(&payload)?, version));
        }
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.store.delete(self.kind, id)
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;

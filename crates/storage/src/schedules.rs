// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule definitions and their derived occurrence rows.
//!
//! Each enabled definition keeps at most one row with `is_next = 1`; the
//! scheduler sleeps until the minimum `run_at` across those rows.

use crate::db::{Database, StorageError};
use lume_core::{MisfirePolicy, ScheduleDefinition, ScheduleOccurrence, Value};
use rusqlite::{params, OptionalExtension};
use std::str::FromStr;

/// Accessor for `schedule_definitions` and `schedule_occurrences`.
#[derive(Clone)]
pub struct ScheduleStore {
    db: Database,
}

impl ScheduleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn upsert_definition(&self, def: &ScheduleDefinition) -> Result<(), StorageError> {
        let args = serde_json::to_string(&def.action_args)?;
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO schedule_definitions
                     (id, time_expr, action_name, action_args, tag, misfire_policy,
                      enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     time_expr = excluded.time_expr,
                     action_name = excluded.action_name,
                     action_args = excluded.action_args,
                     tag = excluded.tag,
                     misfire_policy = excluded.misfire_policy,
                     enabled = excluded.enabled",
                params![
                    def.id,
                    def.time_expr,
                    def.action_name,
                    args,
                    def.tag,
                    def.misfire_policy.as_str(),
                    def.enabled,
                    def.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_definition(&self, id: &str) -> Result<Option<ScheduleDefinition>, StorageError> {
        self.db.with(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, time_expr, action_name, action_args, tag, misfire_policy,
                            enabled, created_at
                     FROM schedule_definitions WHERE id = ?1",
                    params![id],
                    row_to_definition,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_enabled(&self) -> Result<Vec<ScheduleDefinition>, StorageError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, time_expr, action_name, action_args, tag, misfire_policy,
                        enabled, created_at
                 FROM schedule_definitions WHERE enabled = 1 ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_definition)?;
            let mut defs = Vec::new();
            for row in rows {
                defs.push(row?);
            }
            Ok(defs)
        })
    }

    /// Disable the definition and drop its occurrences.
    pub fn disable(&self, id: &str) -> Result<bool, StorageError> {
        self.db.with(|conn| {
            let n = conn.execute(
                "UPDATE schedule_definitions SET enabled = 0 WHERE id = ?1",
                params![id],
            )?;
            conn.execute("DELETE FROM schedule_occurrences WHERE def_id = ?1", params![id])?;
            Ok(n > 0)
        })
    }

    /// Delete the definition; occurrences go with it (FK cascade).
    pub fn delete_definition(&self, id: &str) -> Result<bool, StorageError> {
        self.db.with(|conn| {
            let n =
                conn.execute("DELETE FROM schedule_definitions WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }

    pub fn clear_occurrences(&self, def_id: &str) -> Result<(), StorageError> {
        self.db.with(|conn| {
            conn.execute("DELETE FROM schedule_occurrences WHERE def_id = ?1", params![def_id])?;
            Ok(())
        })
    }

    /// Record a definition's single upcoming occurrence.
    pub fn put_next_occurrence(&self, occ: &ScheduleOccurrence) -> Result<(), StorageError> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO schedule_occurrences (def_id, occurrence_id, run_at, is_next)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(def_id, occurrence_id) DO UPDATE SET
                     run_at = excluded.run_at,
                     is_next = excluded.is_next",
                params![occ.def_id, occ.occurrence_id, occ.run_at, occ.is_next],
            )?;
            Ok(())
        })
    }

    /// Upcoming occurrences that are due at `now`.
    pub fn due_occurrences(&self, now: i64) -> Result<Vec<ScheduleOccurrence>, StorageError> {
        self.db.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT def_id, occurrence_id, run_at, is_next
                 FROM schedule_occurrences
                 WHERE run_at <= ?1 AND is_next = 1
                 ORDER BY run_at, def_id",
            )?;
            let rows = stmt.query_map(params![now], |row| {
                Ok(ScheduleOccurrence {
                    def_id: row.get(0)?,
                    occurrence_id: row.get(1)?,
                    run_at: row.get(2)?,
                    is_next: row.get(3)?,
                })
            })?;
            let mut occs = Vec::new();
            for row in rows {
                occs.push(row?);
            }
            Ok(occs)
        })
    }

    /// Mark an occurrence as no longer upcoming.
    pub fn mark_fired(&self, def_id: &str, occurrence_id: &str) -> Result<(), StorageError> {
        self.db.with(|conn| {
            conn.execute(
                "UPDATE schedule_occurrences SET is_next = 0
                 WHERE def_id = ?1 AND occurrence_id = ?2",
                params![def_id, occurrence_id],
            )?;
            Ok(())
        })
    }

    /// Earliest upcoming `run_at`, or `None` when nothing is scheduled.
    pub fn next_wakeup(&self) -> Result<Option<i64>, StorageError> {
        self.db.with(|conn| {
            let ts = conn.query_row(
                "SELECT MIN(run_at) FROM schedule_occurrences WHERE is_next = 1",
                [],
                |row| row.get::<_, Option<i64>>(0),
            )?;
            Ok(ts)
        })
    }
}

fn row_to_definition(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleDefinition> {
    let args_str: String = row.get(3)?;
    let policy_str: String = row.get(5)?;
    Ok(ScheduleDefinition {
        id: row.get(0)?,
        time_expr: row.get(1)?,
        action_name: row.get(2)?,
        action_args: serde_json::from_str::<Value>(&args_str).unwrap_or(Value::Null),
        tag: row.get(4)?,
        misfire_policy: MisfirePolicy::from_str(&policy_str).unwrap_or_default(),
        enabled: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;

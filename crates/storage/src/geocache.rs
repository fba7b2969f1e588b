// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent geocoding cache

use crate::db::{Database, StorageError};
use rusqlite::{params, OptionalExtension};

/// A cached geocoding result.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoEntry {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Accessor for the `geocache` table, keyed by the raw query string.
#[derive(Clone)]
pub struct Geocache {
    db: Database,
}

impl Geocache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn lookup(&self, query: &str) -> Result<Option<GeoEntry>, StorageError> {
        self.db.with(|conn| {
            let row = conn
                .query_row(
                    "SELECT display_name, latitude, longitude FROM geocache WHERE query = ?1",
                    params![query],
                    |row| {
                        Ok(GeoEntry {
                            display_name: row.get(0)?,
                            latitude: row.get(1)?,
                            longitude: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn store(&self, query: &str, entry: &GeoEntry, now: i64) -> Result<(), StorageError> {
        self.db.with(|conn| {
            conn.execute(
                "INSERT INTO geocache (query, display_name, latitude, longitude, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(query) DO UPDATE SET
                     display_name = excluded.display_name,
                     latitude = excluded.latitude,
                     longitude = excluded.longitude",
                params![query, entry.display_name, entry.latitude, entry.longitude, now],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "geocache_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule definitions and occurrence identifiers

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with occurrences that were due while the process was down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// Drop missed occurrences entirely
    Skip,
    /// Run only the most recent missed occurrence
    #[default]
    RunLatest,
}

impl MisfirePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MisfirePolicy::Skip => "skip",
            MisfirePolicy::RunLatest => "run_latest",
        }
    }
}

impl fmt::Display for MisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MisfirePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(MisfirePolicy::Skip),
            "run_latest" => Ok(MisfirePolicy::RunLatest),
            other => Err(format!("unknown misfire policy: {other}")),
        }
    }
}

/// A user-defined schedule: fire `action_name` whenever `time_expr` matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: String,
    pub time_expr: String,
    pub action_name: String,
    #[serde(default)]
    pub action_args: Value,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub misfire_policy: MisfirePolicy,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: i64,
}

fn default_enabled() -> bool {
    true
}

/// A single computed firing of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOccurrence {
    pub def_id: String,
    pub occurrence_id: String,
    /// Unix seconds
    pub run_at: i64,
    /// Whether this row is the definition's single upcoming occurrence
    pub is_next: bool,
}

/// Canonical occurrence identifier: `"{def_id}/{unix}"`.
///
/// Doubles as the idempotency key for scheduler-driven invocations, which
/// is what makes a firing at-most-once across restarts.
pub fn occurrence_id(def_id: &str, run_at: i64) -> String {
    format!("{def_id}/{run_at}")
}

/// Split an occurrence id back into `(def_id, run_at)`.
pub fn parse_occurrence_id(occurrence_id: &str) -> Option<(&str, i64)> {
    let (def_id, unix) = occurrence_id.rsplit_once('/')?;
    let run_at = unix.parse().ok()?;
    Some((def_id, run_at))
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;

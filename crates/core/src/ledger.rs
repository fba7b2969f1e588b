// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only ledger entry types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome class of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// A stateful action began; replayed on boot if never completed
    ActionStarted,
    /// An action finished successfully. At most one row per non-empty
    /// idempotency key.
    ActionCompleted,
    /// An action returned an error
    ActionFailed,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::ActionStarted => "action_started",
            LedgerEntryType::ActionCompleted => "action_completed",
            LedgerEntryType::ActionFailed => "action_failed",
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action_started" => Ok(LedgerEntryType::ActionStarted),
            "action_completed" => Ok(LedgerEntryType::ActionCompleted),
            "action_failed" => Ok(LedgerEntryType::ActionFailed),
            other => Err(format!("unknown ledger entry type: {other}")),
        }
    }
}

/// One row of the append-only event ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Autoincrement row id; 0 before insertion
    pub id: i64,
    pub entry_type: LedgerEntryType,
    /// Unix seconds, UTC
    pub timestamp: i64,
    pub payload: serde_json::Value,
    /// Free-form origin tag ("scheduler", "webhook", "script", ...)
    pub source: String,
    /// Dedupe key; empty means "not deduped"
    pub idempotency_key: String,
    /// Schedule definition id for scheduler-driven entries; empty otherwise
    pub def_id: String,
}

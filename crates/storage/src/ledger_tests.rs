// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::db::Database;
use lume_core::LedgerEntryType;

fn ledger() -> Ledger {
    Ledger::new(Database::open_in_memory().unwrap())
}

static NULL_PAYLOAD: serde_json::Value = serde_json::Value::Null;

fn completed(key: &str, ts: i64) -> AppendParams<'static> {
    AppendParams {
        entry_type: LedgerEntryType::ActionCompleted,
        timestamp: ts,
        payload: &NULL_PAYLOAD,
        source: "test",
        idempotency_key: leak(key),
        def_id: "",
    }
}

// Test-only: AppendParams borrows, and the fixtures want 'static
fn leak(s: &str) -> &'static str {
    Box::leak(s.to_string().into_boxed_str())
}

#[test]
fn append_and_has_completed() {
    let ledger = ledger();
    assert!(!ledger.has_completed("k1").unwrap());
    assert!(ledger.append(completed("k1", 100)).unwrap());
    assert!(ledger.has_completed("k1").unwrap());
}

#[test]
fn duplicate_completion_collapses() {
    let ledger = ledger();
    assert!(ledger.append(completed("dup", 100)).unwrap());
    assert!(!ledger.append(completed("dup", 101)).unwrap());
    assert_eq!(ledger.entries_for_key("dup").unwrap().len(), 1);
}

#[test]
fn empty_key_completions_are_not_deduped() {
    let ledger = ledger();
    assert!(ledger.append(completed("", 100)).unwrap());
    assert!(ledger.append(completed("", 101)).unwrap());
    assert_eq!(ledger.count_by_type(LedgerEntryType::ActionCompleted).unwrap(), 2);
    assert!(!ledger.has_completed("").unwrap());
}

#[test]
fn failed_entries_do_not_block_completion() {
    let ledger = ledger();
    let failed = AppendParams {
        entry_type: LedgerEntryType::ActionFailed,
        timestamp: 100,
        payload: &serde_json::Value::Null,
        source: "test",
        idempotency_key: "k2",
        def_id: "",
    };
    assert!(ledger.append(failed).unwrap());
    assert!(!ledger.has_completed("k2").unwrap());
    assert!(ledger.append(completed("k2", 101)).unwrap());
    assert!(ledger.has_completed("k2").unwrap());
}

#[test]
fn concurrent_completions_produce_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("ledger.db")).unwrap();
    let mut handles = Vec::new();
    for i in 0..8 {
        let ledger = Ledger::new(db.clone());
        handles.push(std::thread::spawn(move || {
            ledger
                .append(AppendParams {
                    entry_type: LedgerEntryType::ActionCompleted,
                    timestamp: 100 + i,
                    payload: &serde_json::Value::Null,
                    source: "race",
                    idempotency_key: "contested",
                    def_id: "",
                })
                .unwrap()
        }));
    }
    let wins = handles.into_iter().map(|h| h.join()).filter(|r| matches!(r, Ok(true))).count();
    assert_eq!(wins, 1, "exactly one concurrent completion should win");
    let ledger = Ledger::new(db);
    assert_eq!(ledger.entries_for_key("contested").unwrap().len(), 1);
}

#[test]
fn last_completed_for_def_takes_max() {
    let ledger = ledger();
    for (key, ts) in [("wake/100", 100), ("wake/200", 200), ("wake/150", 150)] {
        let mut p = completed(key, ts);
        p.def_id = "wake";
        assert!(ledger.append(p).unwrap());
    }
    assert_eq!(ledger.last_completed_for_def("wake").unwrap(), Some(200));
    assert_eq!(ledger.last_completed_for_def("other").unwrap(), None);
}

#[test]
fn orphaned_started_excludes_completed_keys() {
    let ledger = ledger();
    let started = |key: &'static str, ts| AppendParams {
        entry_type: LedgerEntryType::ActionStarted,
        timestamp: ts,
        payload: &NULL_PAYLOAD,
        source: "test",
        idempotency_key: key,
        def_id: "",
    };
    ledger.append(started("done", 100)).unwrap();
    ledger.append(started("pending", 110)).unwrap();
    ledger.append(completed("done", 120)).unwrap();

    let orphans = ledger.orphaned_started().unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].idempotency_key, "pending");
}

#[test]
fn delete_older_than_prunes_by_timestamp() {
    let ledger = ledger();
    ledger.append(completed("old", 100)).unwrap();
    ledger.append(completed("new", 200)).unwrap();
    assert_eq!(ledger.delete_older_than(150).unwrap(), 1);
    assert!(!ledger.has_completed("old").unwrap());
    assert!(ledger.has_completed("new").unwrap());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::db::Database;
use lume_core::occurrence_id;

fn store() -> ScheduleStore {
    ScheduleStore::new(Database::open_in_memory().unwrap())
}

fn def(id: &str) -> ScheduleDefinition {
    ScheduleDefinition {
        id: id.to_string(),
        time_expr: "07:00".to_string(),
        action_name: "sceneA".to_string(),
        action_args: Value::Null,
        tag: "morning".to_string(),
        misfire_policy: MisfirePolicy::RunLatest,
        enabled: true,
        created_at: 100,
    }
}

fn next_occ(def_id: &str, run_at: i64) -> ScheduleOccurrence {
    ScheduleOccurrence {
        def_id: def_id.to_string(),
        occurrence_id: occurrence_id(def_id, run_at),
        run_at,
        is_next: true,
    }
}

#[test]
fn upsert_and_get_definition() {
    let store = store();
    store.upsert_definition(&def("wake")).unwrap();
    let read = store.get_definition("wake").unwrap().unwrap();
    assert_eq!(read.time_expr, "07:00");
    assert_eq!(read.misfire_policy, MisfirePolicy::RunLatest);

    // Upsert replaces fields but keeps created_at semantics simple
    let mut updated = def("wake");
    updated.time_expr = "08:00".to_string();
    store.upsert_definition(&updated).unwrap();
    assert_eq!(store.get_definition("wake").unwrap().unwrap().time_expr, "08:00");
}

#[test]
fn list_enabled_skips_disabled() {
    let store = store();
    store.upsert_definition(&def("a")).unwrap();
    store.upsert_definition(&def("b")).unwrap();
    store.disable("a").unwrap();
    let enabled = store.list_enabled().unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id, "b");
}

#[test]
fn disable_clears_occurrences() {
    let store = store();
    store.upsert_definition(&def("wake")).unwrap();
    store.put_next_occurrence(&next_occ("wake", 1000)).unwrap();
    assert_eq!(store.next_wakeup().unwrap(), Some(1000));
    store.disable("wake").unwrap();
    assert_eq!(store.next_wakeup().unwrap(), None);
}

#[test]
fn delete_cascades_occurrences() {
    let store = store();
    store.upsert_definition(&def("wake")).unwrap();
    store.put_next_occurrence(&next_occ("wake", 1000)).unwrap();
    assert!(store.delete_definition("wake").unwrap());
    assert_eq!(store.next_wakeup().unwrap(), None);
}

#[test]
fn due_occurrences_respects_cutoff_and_is_next() {
    let store = store();
    store.upsert_definition(&def("early")).unwrap();
    store.upsert_definition(&def("late")).unwrap();
    store.upsert_definition(&def("fired")).unwrap();
    store.put_next_occurrence(&next_occ("early", 900)).unwrap();
    store.put_next_occurrence(&next_occ("late", 2000)).unwrap();
    let mut fired = next_occ("fired", 800);
    fired.is_next = false;
    store.put_next_occurrence(&fired).unwrap();

    let due = store.due_occurrences(1000).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].def_id, "early");
}

#[test]
fn mark_fired_removes_from_wakeup() {
    let store = store();
    store.upsert_definition(&def("wake")).unwrap();
    let occ = next_occ("wake", 900);
    store.put_next_occurrence(&occ).unwrap();
    store.mark_fired("wake", &occ.occurrence_id).unwrap();
    assert!(store.due_occurrences(1000).unwrap().is_empty());
    assert_eq!(store.next_wakeup().unwrap(), None);
}

#[test]
fn next_wakeup_is_minimum() {
    let store = store();
    store.upsert_definition(&def("a")).unwrap();
    store.upsert_definition(&def("b")).unwrap();
    store.put_next_occurrence(&next_occ("a", 5000)).unwrap();
    store.put_next_occurrence(&next_occ("b", 3000)).unwrap();
    assert_eq!(store.next_wakeup().unwrap(), Some(3000));
}

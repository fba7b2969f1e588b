// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::Action;
use lume_core::{FakeClock, Kind};
use lume_storage::{Database, Ledger, ResourceStore};
use std::sync::atomic::{AtomicUsize, Ordering};

struct FakeActual;

impl ActualReader for FakeActual {
    fn group_actual(&self, _id: &str) -> Result<GroupActual, InvokeError> {
        Ok(GroupActual::default())
    }

    fn light_actual(&self, _id: &str) -> Result<LightActual, InvokeError> {
        Ok(LightActual::default())
    }
}

struct Fixture {
    invoker: Invoker<FakeClock>,
    ctx: ActionContext,
    ledger: Ledger,
    groups: TypedStore<GroupDesired>,
    registry: Arc<ActionRegistry>,
}

fn fixture() -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let ledger = Ledger::new(db.clone());
    let resources = ResourceStore::new(db);
    let groups = resources.typed::<GroupDesired>(Kind::Group);
    let lights = resources.typed::<LightDesired>(Kind::Light);
    let registry = Arc::new(ActionRegistry::new());
    let clock = FakeClock::new();
    let epoch_clock = clock.clone();

    let ctx = ActionContext::new(
        CancellationToken::new(),
        groups.clone(),
        lights,
        Arc::new(FakeActual),
        crate::reconcile::ReconcileHandle::detached(),
        Arc::new(move || epoch_clock.epoch_secs()),
    );
    let invoker = Invoker::new(Arc::clone(&registry), ledger.clone(), clock);
    Fixture { invoker, ctx, ledger, groups, registry }
}

fn counting_action(name: &str, count: &Arc<AtomicUsize>) -> Action {
    let count = Arc::clone(count);
    Action::new(name, Arc::new(move |_, _| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}

static NULL_ARGS: Value = Value::Null;

fn keyed(name: &'static str, key: &'static str) -> InvokeParams<'static> {
    InvokeParams { name, args: &NULL_ARGS, idempotency_key: key, source: "test", def_id: "" }
}

#[test]
fn unknown_action_fails_and_is_ledgered() {
    let f = fixture();
    let err = f.invoker.invoke(&f.ctx, keyed("nope", "k1")).unwrap_err();
    assert!(matches!(err, InvokeError::UnknownAction(_)));

    let entries = f.ledger.entries_for_key("k1").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, lume_core::LedgerEntryType::ActionFailed);
}

#[test]
fn successful_invoke_completes_once() {
    let f = fixture();
    let count = Arc::new(AtomicUsize::new(0));
    f.registry.register(counting_action("go", &count)).unwrap();

    f.invoker.invoke(&f.ctx, keyed("go", "k1")).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(f.ledger.has_completed("k1").unwrap());
}

#[test]
fn repeat_invocations_with_same_key_run_once() {
    let f = fixture();
    let count = Arc::new(AtomicUsize::new(0));
    f.registry.register(counting_action("go", &count)).unwrap();

    for _ in 0..5 {
        f.invoker.invoke(&f.ctx, keyed("go", "k1")).unwrap();
    }
    assert_eq!(count.load(Ordering::SeqCst), 1, "execute runs exactly once per key");
    assert_eq!(f.ledger.entries_for_key("k1").unwrap().len(), 1);
}

#[test]
fn different_keys_run_independently() {
    let f = fixture();
    let count = Arc::new(AtomicUsize::new(0));
    f.registry.register(counting_action("go", &count)).unwrap();

    f.invoker.invoke(&f.ctx, keyed("go", "k1")).unwrap();
    f.invoker.invoke(&f.ctx, keyed("go", "k2")).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn empty_key_skips_the_ledger() {
    let f = fixture();
    let count = Arc::new(AtomicUsize::new(0));
    f.registry.register(counting_action("go", &count)).unwrap();

    f.invoker.invoke(&f.ctx, keyed("go", "")).unwrap();
    f.invoker.invoke(&f.ctx, keyed("go", "")).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2, "manual calls bypass dedupe");
    assert_eq!(
        f.ledger.count_by_type(lume_core::LedgerEntryType::ActionCompleted).unwrap(),
        0
    );
}

#[test]
fn failed_action_records_failure_and_can_retry() {
    let f = fixture();
    let attempts = Arc::new(AtomicUsize::new(0));
    let a = Arc::clone(&attempts);
    f.registry
        .register(Action::new("flaky", Arc::new(move |_, _| {
            if a.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(InvokeError::Bridge("timeout".into()))
            } else {
                Ok(())
            }
        })))
        .unwrap();

    assert!(f.invoker.invoke(&f.ctx, keyed("flaky", "k1")).is_err());
    assert!(!f.ledger.has_completed("k1").unwrap(), "failure does not complete");

    f.invoker.invoke(&f.ctx, keyed("flaky", "k1")).unwrap();
    assert!(f.ledger.has_completed("k1").unwrap());

    let entries = f.ledger.entries_for_key("k1").unwrap();
    assert_eq!(entries.len(), 2, "one failed, one completed");
}

#[test]
fn staged_changes_flush_on_success() {
    let f = fixture();
    f.registry
        .register(Action::new("scene", Arc::new(|ctx, args| {
            let scene = args.get("scene").and_then(Value::as_str).unwrap_or("Relax");
            ctx.group("5").power(true).scene(scene).stage();
            Ok(())
        })))
        .unwrap();

    let mut args = lume_core::ValueMap::new();
    args.insert("scene".into(), "Energize".into());
    let args = Value::Map(args);
    let params =
        InvokeParams { name: "scene", args: &args, idempotency_key: "", source: "test", def_id: "" };
    f.invoker.invoke(&f.ctx, params).unwrap();

    let (desired, version) = f.groups.get("5").unwrap().unwrap();
    assert_eq!(desired.power, Some(true));
    assert_eq!(desired.scene_name.as_deref(), Some("Energize"));
    assert_eq!(version, 1);
}

#[test]
fn staged_changes_are_discarded_on_failure() {
    let f = fixture();
    f.registry
        .register(Action::new("half", Arc::new(|ctx, _| {
            ctx.group("5").power(true).stage();
            Err(InvokeError::Script("user error".into()))
        })))
        .unwrap();

    let _ = f.invoker.invoke(&f.ctx, keyed("half", ""));
    assert!(f.groups.get("5").unwrap().is_none(), "failed action leaves no state behind");
}

#[test]
fn stateful_invoke_persists_capture_before_execute() {
    let f = fixture();
    let seen = Arc::new(parking_lot::Mutex::new(Value::Null));
    let s = Arc::clone(&seen);
    f.registry
        .register(Action::stateful(
            "capture",
            Arc::new(|_, _args| {
                // At-fire-time input that must replay identically
                let mut m = lume_core::ValueMap::new();
                m.insert("captured_at".into(), Value::Int(42));
                Ok(Value::Map(m))
            }),
            Arc::new(move |_, args| {
                *s.lock() = args.clone();
                Ok(())
            }),
        ))
        .unwrap();

    f.invoker.invoke_stateful(&f.ctx, keyed("capture", "s1")).unwrap();

    assert_eq!(seen.lock().get("captured_at").and_then(Value::as_i64), Some(42));
    let entries = f.ledger.entries_for_key("s1").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].entry_type, lume_core::LedgerEntryType::ActionStarted);
    assert_eq!(entries[0].payload["args"]["captured_at"], 42);
    assert_eq!(entries[1].entry_type, lume_core::LedgerEntryType::ActionCompleted);
}

#[test]
fn replay_orphans_reruns_started_without_completed() {
    let f = fixture();
    let count = Arc::new(AtomicUsize::new(0));
    f.registry.register(counting_action("orphan", &count)).unwrap();

    // A crash after capture: started entry with no completion
    let payload = serde_json::json!({"action": "orphan", "args": {"x": 1}});
    f.ledger
        .append(lume_storage::AppendParams {
            entry_type: lume_core::LedgerEntryType::ActionStarted,
            timestamp: 100,
            payload: &payload,
            source: "test",
            idempotency_key: "o1",
            def_id: "",
        })
        .unwrap();

    assert_eq!(f.invoker.replay_orphans(&f.ctx).unwrap(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(f.ledger.has_completed("o1").unwrap());

    // Replay is idempotent across boots
    assert_eq!(f.invoker.replay_orphans(&f.ctx).unwrap(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bus::BusConfig;
use crate::evaluator::FixedEvaluator;
use chrono::TimeZone;
use lume_core::{EventType, FakeClock, LedgerEntryType};
use lume_storage::{AppendParams, Database};
use parking_lot::Mutex;

struct Fixture {
    sched: Scheduler<FakeClock>,
    clock: FakeClock,
    bus: EventBus,
    events: Arc<Mutex<Vec<BusEvent>>>,
    ledger: Ledger,
    store: ScheduleStore,
}

fn fixture() -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let store = ScheduleStore::new(db.clone());
    let ledger = Ledger::new(db);
    let bus = EventBus::new(BusConfig::default());
    let clock = FakeClock::new();
    clock.set_utc(Utc.with_ymd_and_hms(2026, 1, 15, 5, 0, 0).single().unwrap());

    let events: Arc<Mutex<Vec<BusEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe(EventType::Schedule, Arc::new(move |event| {
        sink.lock().push(event.clone());
    }));

    let evaluator = Arc::new(FixedEvaluator::new(chrono_tz::UTC));
    let sched =
        Scheduler::new(store.clone(), ledger.clone(), bus.clone(), evaluator, clock.clone());
    Fixture { sched, clock, bus, events, ledger, store }
}

fn spec(id: &str, expr: &str, tag: &str) -> ScheduleSpec {
    ScheduleSpec {
        id: id.to_string(),
        time_expr: expr.to_string(),
        action_name: "sceneA".to_string(),
        action_args: Value::Null,
        tag: tag.to_string(),
        misfire_policy: MisfirePolicy::RunLatest,
    }
}

fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap().timestamp()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn define_rejects_bad_expressions() {
    let f = fixture();
    assert!(matches!(
        f.sched.define(spec("bad", "25:00", "")),
        Err(ScheduleError::Expr(_))
    ));
    assert!(matches!(
        f.sched.define(spec("solar", "@sunset", "")),
        Err(ScheduleError::Eval(EvalError::SolarUnsupported))
    ));
    f.bus.close(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn define_computes_the_next_occurrence() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "morning")).unwrap();
    assert_eq!(f.store.next_wakeup().unwrap(), Some(ts(2026, 1, 15, 7, 0)));
    f.bus.close(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fire_due_publishes_and_recomputes() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "morning")).unwrap();

    // Not due yet
    assert_eq!(f.sched.fire_due().unwrap(), 0);

    f.clock.set_utc(Utc.with_ymd_and_hms(2026, 1, 15, 7, 0, 0).single().unwrap());
    assert_eq!(f.sched.fire_due().unwrap(), 1);

    // Firing again at the same instant does nothing: is_next was cleared
    assert_eq!(f.sched.fire_due().unwrap(), 0);

    // Next occurrence moved to tomorrow
    assert_eq!(f.store.next_wakeup().unwrap(), Some(ts(2026, 1, 16, 7, 0)));

    f.bus.close(Duration::from_secs(1)).await;
    let events = f.events.lock();
    assert_eq!(events.len(), 1);
    let expected_occ = format!("wake/{}", ts(2026, 1, 15, 7, 0));
    assert_eq!(events[0].str_field("occurrence_id"), Some(expected_occ.as_str()));
    assert_eq!(events[0].str_field("schedule_id"), Some("wake"));
    assert_eq!(events[0].str_field("action_name"), Some("sceneA"));
    assert_eq!(events[0].str_field("source"), Some("scheduler"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disable_stops_firing() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "")).unwrap();
    assert!(f.sched.disable("wake").unwrap());
    f.clock.set_utc(Utc.with_ymd_and_hms(2026, 1, 15, 7, 30, 0).single().unwrap());
    assert_eq!(f.sched.fire_due().unwrap(), 0);
    f.bus.close(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn misfire_run_latest_replays_only_the_most_recent() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "morning")).unwrap();

    // Last completion three days ago at 07:00; daemon was down since
    let payload = serde_json::json!({"action": "sceneA"});
    f.ledger
        .append(AppendParams {
            entry_type: LedgerEntryType::ActionCompleted,
            timestamp: ts(2026, 1, 12, 7, 0),
            payload: &payload,
            source: "scheduler",
            idempotency_key: &format!("wake/{}", ts(2026, 1, 12, 7, 0)),
            def_id: "wake",
        })
        .unwrap();

    // Boot at 07:05 today: the 13th, 14th, and today's 07:00 were missed
    f.clock.set_utc(Utc.with_ymd_and_hms(2026, 1, 15, 7, 5, 0).single().unwrap());
    f.sched.recover_misfires().unwrap();

    f.bus.close(Duration::from_secs(1)).await;
    let events = f.events.lock();
    assert_eq!(events.len(), 1, "exactly one replay, not one per missed day");
    let expected_occ = format!("wake/{}", ts(2026, 1, 15, 7, 0));
    assert_eq!(events[0].str_field("occurrence_id"), Some(expected_occ.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn misfire_skip_drops_missed_occurrences() {
    let f = fixture();
    let mut s = spec("wake", "07:00", "");
    s.misfire_policy = MisfirePolicy::Skip;
    f.sched.define(s).unwrap();

    let payload = serde_json::json!({"action": "sceneA"});
    f.ledger
        .append(AppendParams {
            entry_type: LedgerEntryType::ActionCompleted,
            timestamp: ts(2026, 1, 12, 7, 0),
            payload: &payload,
            source: "scheduler",
            idempotency_key: &format!("wake/{}", ts(2026, 1, 12, 7, 0)),
            def_id: "wake",
        })
        .unwrap();

    f.clock.set_utc(Utc.with_ymd_and_hms(2026, 1, 15, 7, 5, 0).single().unwrap());
    f.sched.recover_misfires().unwrap();

    f.bus.close(Duration::from_secs(1)).await;
    assert!(f.events.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn misfire_without_any_completion_does_nothing() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "")).unwrap();
    f.clock.set_utc(Utc.with_ymd_and_hms(2026, 1, 20, 7, 5, 0).single().unwrap());
    f.sched.recover_misfires().unwrap();
    f.bus.close(Duration::from_secs(1)).await;
    assert!(f.events.lock().is_empty(), "no completion history means no misfire");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_closest_next_picks_the_nearest_tagged_definition() {
    let f = fixture();
    // Clock is 05:00: "soon" at 06:00 is closer than "later" at 09:00
    f.sched.define(spec("later", "09:00", "scenes")).unwrap();
    f.sched.define(spec("soon", "06:00", "scenes")).unwrap();
    f.sched.define(spec("othertag", "05:30", "ignored")).unwrap();

    let chosen = f.sched.run_closest(&["scenes"], ClosestStrategy::Next).unwrap();
    assert_eq!(chosen.as_deref(), Some("soon"));

    f.bus.close(Duration::from_secs(1)).await;
    let events = f.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].str_field("occurrence_id"), Some(""), "manual calls carry no key");
    assert_eq!(events[0].str_field("source"), Some("manual"));
    assert_eq!(events[0].str_field("schedule_id"), Some("soon"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_closest_prev_looks_backward() {
    let f = fixture();
    // Clock is 05:00: most recent past occurrence wins
    f.sched.define(spec("evening", "22:00", "scenes")).unwrap();
    f.sched.define(spec("midnight", "00:30", "scenes")).unwrap();

    let chosen = f.sched.run_closest(&["scenes"], ClosestStrategy::Prev).unwrap();
    assert_eq!(chosen.as_deref(), Some("midnight"));
    f.bus.close(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_closest_with_no_match_returns_none() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "morning")).unwrap();
    assert_eq!(f.sched.run_closest(&["nonexistent"], ClosestStrategy::Next).unwrap(), None);
    f.bus.close(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redefining_a_schedule_replaces_its_occurrence() {
    let f = fixture();
    f.sched.define(spec("wake", "07:00", "")).unwrap();
    f.sched.define(spec("wake", "08:00", "")).unwrap();
    assert_eq!(f.store.next_wakeup().unwrap(), Some(ts(2026, 1, 15, 8, 0)));
    f.bus.close(Duration::from_secs(1)).await;
}

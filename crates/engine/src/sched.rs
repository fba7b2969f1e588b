// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent, misfire-aware schedule engine.
//!
//! The scheduler never invokes actions itself: a due occurrence becomes
//! a `schedule` bus event whose handler routes to the script host and
//! the invoker, with the occurrence id as the idempotency key. That
//! indirection is what sequences schedule-driven actions with every
//! other action and makes each firing at-most-once across restarts.

use crate::bus::EventBus;
use crate::evaluator::{EvalError, Evaluator};
use chrono::{DateTime, Utc};
use lume_core::{
    occurrence_id, parse_time_expr, BusEvent, Clock, MisfirePolicy, ScheduleDefinition,
    ScheduleOccurrence, TimeExprError, Value,
};
use lume_storage::{Ledger, ScheduleStore, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on one sleep; re-checks the table at least hourly.
const MAX_SLEEP: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid time expression: {0}")]
    Expr(#[from] TimeExprError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Arguments to [`Scheduler::define`].
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub id: String,
    pub time_expr: String,
    pub action_name: String,
    pub action_args: Value,
    pub tag: String,
    pub misfire_policy: MisfirePolicy,
}

/// Direction for [`Scheduler::run_closest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosestStrategy {
    Next,
    Prev,
}

/// Owns schedule definitions and fires their occurrences.
pub struct Scheduler<C: Clock> {
    store: ScheduleStore,
    ledger: Ledger,
    bus: EventBus,
    evaluator: Arc<dyn Evaluator>,
    clock: C,
    resched: Arc<Notify>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        store: ScheduleStore,
        ledger: Ledger,
        bus: EventBus,
        evaluator: Arc<dyn Evaluator>,
        clock: C,
    ) -> Self {
        Self { store, ledger, bus, evaluator, clock, resched: Arc::new(Notify::new()) }
    }

    /// Validate the expression, upsert the definition, and reschedule.
    /// Expression errors surface to the caller immediately.
    pub fn define(&self, spec: ScheduleSpec) -> Result<(), ScheduleError> {
        let expr = parse_time_expr(&spec.time_expr)?;
        // Probing the evaluator rejects solar expressions when no geo
        // configuration is available.
        self.evaluator.next(&expr, self.clock.now_utc())?;

        let def = ScheduleDefinition {
            id: spec.id,
            time_expr: spec.time_expr,
            action_name: spec.action_name,
            action_args: spec.action_args,
            tag: spec.tag,
            misfire_policy: spec.misfire_policy,
            enabled: true,
            created_at: self.clock.epoch_secs(),
        };
        self.store.upsert_definition(&def)?;
        self.recompute_definition(&def)?;
        self.resched.notify_one();
        info!(id = def.id, expr = def.time_expr, "schedule defined");
        Ok(())
    }

    /// Disable a definition and drop its occurrences.
    pub fn disable(&self, id: &str) -> Result<bool, ScheduleError> {
        let disabled = self.store.disable(id)?;
        self.resched.notify_one();
        if disabled {
            info!(id, "schedule disabled");
        }
        Ok(disabled)
    }

    /// Recompute the single next occurrence for every enabled definition.
    pub fn recompute_all(&self) -> Result<(), ScheduleError> {
        for def in self.store.list_enabled()? {
            self.recompute_definition(&def)?;
        }
        self.resched.notify_one();
        Ok(())
    }

    fn recompute_definition(&self, def: &ScheduleDefinition) -> Result<(), ScheduleError> {
        self.store.clear_occurrences(&def.id)?;
        let expr = parse_time_expr(&def.time_expr)?;
        match self.evaluator.next(&expr, self.clock.now_utc())? {
            Some(at) => {
                let run_at = at.timestamp();
                self.store.put_next_occurrence(&ScheduleOccurrence {
                    def_id: def.id.clone(),
                    occurrence_id: occurrence_id(&def.id, run_at),
                    run_at,
                    is_next: true,
                })?;
                debug!(id = def.id, run_at, "next occurrence computed");
            }
            None => {
                // Polar skip: no occurrence within the scan window
                debug!(id = def.id, "no upcoming occurrence");
            }
        }
        Ok(())
    }

    /// Fire everything due now: publish a `schedule` event per occurrence,
    /// retire it, and compute the definition's next one.
    pub fn fire_due(&self) -> Result<usize, ScheduleError> {
        let now = self.clock.epoch_secs();
        let due = self.store.due_occurrences(now)?;
        let mut fired = 0;
        for occ in due {
            let Some(def) = self.store.get_definition(&occ.def_id)? else {
                warn!(def_id = occ.def_id, "occurrence without definition, dropping");
                self.store.mark_fired(&occ.def_id, &occ.occurrence_id)?;
                continue;
            };
            debug!(id = def.id, occurrence = occ.occurrence_id, "schedule due");
            self.bus.publish(BusEvent::schedule(
                &def.action_name,
                def.action_args.clone(),
                &occ.occurrence_id,
                &def.id,
            ));
            self.store.mark_fired(&occ.def_id, &occ.occurrence_id)?;
            self.recompute_definition(&def)?;
            fired += 1;
        }
        Ok(fired)
    }

    /// Boot recovery: walk each definition forward from its last
    /// completion and apply the misfire policy to anything missed.
    pub fn recover_misfires(&self) -> Result<(), ScheduleError> {
        let now = self.clock.now_utc();
        for def in self.store.list_enabled()? {
            let Some(last_ts) = self.ledger.last_completed_for_def(&def.id)? else {
                continue;
            };
            let expr = match parse_time_expr(&def.time_expr) {
                Ok(expr) => expr,
                Err(err) => {
                    warn!(id = def.id, error = %err, "unparseable stored expression");
                    continue;
                }
            };
            let Some(last) = DateTime::<Utc>::from_timestamp(last_ts, 0) else {
                continue;
            };

            let mut missed: Vec<DateTime<Utc>> = Vec::new();
            let mut cursor = last;
            while let Some(at) = self.evaluator.next(&expr, cursor)? {
                if at > now {
                    break;
                }
                missed.push(at);
                cursor = at;
            }
            if missed.is_empty() {
                continue;
            }

            match def.misfire_policy {
                MisfirePolicy::Skip => {
                    info!(id = def.id, count = missed.len(), "skipping missed occurrences");
                }
                MisfirePolicy::RunLatest => {
                    // Only the most recent miss runs; the ledger still
                    // dedupes if it already completed under this id.
                    if let Some(latest) = missed.last() {
                        let run_at = latest.timestamp();
                        let occ_id = occurrence_id(&def.id, run_at);
                        info!(
                            id = def.id,
                            occurrence = occ_id,
                            skipped = missed.len() - 1,
                            "replaying latest missed occurrence"
                        );
                        self.bus.publish(BusEvent::schedule(
                            &def.action_name,
                            def.action_args.clone(),
                            &occ_id,
                            &def.id,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fire the enabled definition whose occurrence is closest to now,
    /// restricted to the given tags. Manual by design: the published
    /// event carries no occurrence id, so the invocation bypasses
    /// dedupe. Returns the chosen definition id.
    pub fn run_closest(
        &self,
        tags: &[&str],
        strategy: ClosestStrategy,
    ) -> Result<Option<String>, ScheduleError> {
        let now = self.clock.now_utc();
        let mut best: Option<(chrono::Duration, String, ScheduleDefinition)> = None;
        for def in self.store.list_enabled()? {
            if !tags.contains(&def.tag.as_str()) {
                continue;
            }
            let expr = match parse_time_expr(&def.time_expr) {
                Ok(expr) => expr,
                Err(_) => continue,
            };
            let at = match strategy {
                ClosestStrategy::Next => self.evaluator.next(&expr, now)?,
                ClosestStrategy::Prev => self.evaluator.prev(&expr, now)?,
            };
            let Some(at) = at else { continue };
            let distance = (at - now).abs();
            let replace = match &best {
                None => true,
                Some((best_distance, best_id, _)) => {
                    distance < *best_distance
                        || (distance == *best_distance && def.id < *best_id)
                }
            };
            if replace {
                best = Some((distance, def.id.clone(), def));
            }
        }

        let Some((_, _, def)) = best else { return Ok(None) };
        let mut event =
            BusEvent::schedule(&def.action_name, def.action_args.clone(), "", &def.id);
        event.data.insert("source".into(), "manual".into());
        self.bus.publish(event);
        Ok(Some(def.id))
    }

    /// Run until cancelled: sleep to the next occurrence (or an hour),
    /// wake early on reschedule signals, and fire what is due.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("scheduler started");
        loop {
            let sleep_for = match self.store.next_wakeup() {
                Ok(Some(run_at)) => {
                    let now = self.clock.epoch_secs();
                    Duration::from_secs(run_at.saturating_sub(now).max(0) as u64).min(MAX_SLEEP)
                }
                Ok(None) => MAX_SLEEP,
                Err(err) => {
                    warn!(error = %err, "reading next wakeup failed");
                    MAX_SLEEP
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.resched.notified() => continue,
                _ = tokio::time::sleep(sleep_for) => {}
            }

            if let Err(err) = self.fire_due() {
                warn!(error = %err, "firing due occurrences failed");
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
#[path = "sched_tests.rs"]
mod tests;

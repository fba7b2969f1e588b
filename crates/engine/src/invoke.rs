// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action invocation with ledgered idempotency.
//!
//! Every invocation that carries a non-empty key is at-most-once at the
//! ledger: a recorded completion short-circuits re-invocation, and the
//! unique completion index collapses concurrent duplicates. Execution
//! itself may repeat (the key is checked before, not during); callers
//! needing crash-safe inputs use the stateful variant, whose captured
//! payload is persisted before execution and replayed at boot.

use crate::builders::{
    merge_group, merge_light, GroupStateBuilder, LightStateBuilder, PendingChanges, StagedChange,
};
use crate::reconcile::ReconcileHandle;
use crate::registry::ActionRegistry;
use lume_core::{
    Clock, GroupActual, GroupDesired, LedgerEntryType, LightActual, LightDesired, Value,
};
use lume_storage::{AppendParams, Ledger, StorageError, TypedStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("action already registered: {0}")]
    DuplicateAction(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("bridge error: {0}")]
    Bridge(String),
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Script(String),
}

/// Request metadata attached to webhook-originated invocations.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub path_params: BTreeMap<String, String>,
}

/// Synchronous view of bridge actual state for action bodies.
///
/// Implementations block on the underlying HTTP call; action bodies run
/// on the script host's dedicated thread, where blocking is fine.
pub trait ActualReader: Send + Sync {
    fn group_actual(&self, id: &str) -> Result<GroupActual, InvokeError>;
    fn light_actual(&self, id: &str) -> Result<LightActual, InvokeError>;
}

/// Per-invocation context handed to action bodies.
#[derive(Clone)]
pub struct ActionContext {
    pub cancel: CancellationToken,
    groups: TypedStore<GroupDesired>,
    lights: TypedStore<LightDesired>,
    actual: Arc<dyn ActualReader>,
    reconcile: ReconcileHandle,
    pending: PendingChanges,
    epoch: Arc<dyn Fn() -> i64 + Send + Sync>,
    pub request: Option<RequestMeta>,
}

impl ActionContext {
    pub fn new(
        cancel: CancellationToken,
        groups: TypedStore<GroupDesired>,
        lights: TypedStore<LightDesired>,
        actual: Arc<dyn ActualReader>,
        reconcile: ReconcileHandle,
        epoch: Arc<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            cancel,
            groups,
            lights,
            actual,
            reconcile,
            pending: PendingChanges::new(),
            epoch,
            request: None,
        }
    }

    pub fn with_request(mut self, request: RequestMeta) -> Self {
        self.request = Some(request);
        self
    }

    /// Start staging changes for a group.
    pub fn group(&self, id: &str) -> GroupStateBuilder {
        GroupStateBuilder::new(id, self.pending.clone())
    }

    /// Start staging changes for a light.
    pub fn light(&self, id: &str) -> LightStateBuilder {
        LightStateBuilder::new(id, self.pending.clone())
    }

    pub fn group_desired(&self, id: &str) -> Result<Option<GroupDesired>, InvokeError> {
        Ok(self.groups.get(id)?.map(|(v, _)| v))
    }

    pub fn light_desired(&self, id: &str) -> Result<Option<LightDesired>, InvokeError> {
        Ok(self.lights.get(id)?.map(|(v, _)| v))
    }

    pub fn group_actual(&self, id: &str) -> Result<GroupActual, InvokeError> {
        self.actual.group_actual(id)
    }

    pub fn light_actual(&self, id: &str) -> Result<LightActual, InvokeError> {
        self.actual.light_actual(id)
    }

    /// Flush staged changes now and request reconciliation, without
    /// waiting for the action to complete.
    pub fn reconcile(&self) -> Result<(), InvokeError> {
        self.flush_pending()?;
        self.reconcile.trigger();
        Ok(())
    }

    /// Write staged patches through the typed stores and pend each
    /// touched resource for reconciliation. Called by the invoker when
    /// the action body returns, and by [`Self::reconcile`].
    pub fn flush_pending(&self) -> Result<(), InvokeError> {
        let staged = self.pending.take();
        if staged.is_empty() {
            return Ok(());
        }
        let now = (self.epoch)();
        for change in staged {
            let key = change.key();
            match change {
                StagedChange::Group { id, patch } => {
                    self.groups.update(&id, now, |current| merge_group(current, &patch))?;
                }
                StagedChange::Light { id, patch } => {
                    self.lights.update(&id, now, |current| merge_light(current, &patch))?;
                }
            }
            self.reconcile.trigger_resource(key);
        }
        Ok(())
    }

    /// Drop staged changes without applying them (failed action body).
    pub fn discard_pending(&self) {
        let _ = self.pending.take();
    }
}

/// Fully specified invocation request.
pub struct InvokeParams<'a> {
    pub name: &'a str,
    pub args: &'a Value,
    pub idempotency_key: &'a str,
    pub source: &'a str,
    pub def_id: &'a str,
}

impl<'a> InvokeParams<'a> {
    /// Manual invocation: no dedupe key, no schedule attribution.
    pub fn manual(name: &'a str, args: &'a Value) -> Self {
        Self { name, args, idempotency_key: "", source: "script", def_id: "" }
    }
}

/// Looks up actions, runs them, and records outcomes in the ledger.
pub struct Invoker<C: Clock> {
    registry: Arc<ActionRegistry>,
    ledger: Ledger,
    clock: C,
}

impl<C: Clock> Invoker<C> {
    pub fn new(registry: Arc<ActionRegistry>, ledger: Ledger, clock: C) -> Self {
        Self { registry, ledger, clock }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Invoke an action; see the module docs for the idempotency rules.
    pub fn invoke(&self, ctx: &ActionContext, params: InvokeParams<'_>) -> Result<(), InvokeError> {
        if !params.idempotency_key.is_empty()
            && self.ledger.has_completed(params.idempotency_key)?
        {
            debug!(action = params.name, key = params.idempotency_key, "already completed, skipping");
            return Ok(());
        }

        let Some(action) = self.registry.get(params.name) else {
            let err = InvokeError::UnknownAction(params.name.to_string());
            self.record_failure(&params, &err);
            return Err(err);
        };

        match (action.execute)(ctx, params.args) {
            Ok(()) => {
                if let Err(err) = ctx.flush_pending() {
                    warn!(action = params.name, error = %err, "flushing staged state failed");
                }
                self.record_completion(&params);
                Ok(())
            }
            Err(err) => {
                ctx.discard_pending();
                self.record_failure(&params, &err);
                Err(err)
            }
        }
    }

    /// Stateful invocation: capture inputs, persist a started entry, then
    /// execute with the captured payload.
    pub fn invoke_stateful(
        &self,
        ctx: &ActionContext,
        params: InvokeParams<'_>,
    ) -> Result<(), InvokeError> {
        if !params.idempotency_key.is_empty()
            && self.ledger.has_completed(params.idempotency_key)?
        {
            debug!(action = params.name, key = params.idempotency_key, "already completed, skipping");
            return Ok(());
        }

        let Some(action) = self.registry.get(params.name) else {
            let err = InvokeError::UnknownAction(params.name.to_string());
            self.record_failure(&params, &err);
            return Err(err);
        };

        let captured = match &action.capture {
            Some(capture) => capture(ctx, params.args)?,
            None => params.args.clone(),
        };

        let payload = serde_json::json!({ "action": params.name, "args": captured.to_json() });
        if let Err(err) = self.ledger.append(AppendParams {
            entry_type: LedgerEntryType::ActionStarted,
            timestamp: self.clock.epoch_secs(),
            payload: &payload,
            source: params.source,
            idempotency_key: params.idempotency_key,
            def_id: params.def_id,
        }) {
            warn!(action = params.name, error = %err, "recording action start failed");
        }

        match (action.execute)(ctx, &captured) {
            Ok(()) => {
                if let Err(err) = ctx.flush_pending() {
                    warn!(action = params.name, error = %err, "flushing staged state failed");
                }
                self.record_completion(&params);
                Ok(())
            }
            Err(err) => {
                ctx.discard_pending();
                self.record_failure(&params, &err);
                Err(err)
            }
        }
    }

    /// Re-run started-but-never-completed stateful actions with their
    /// captured payloads. Returns how many replays completed.
    pub fn replay_orphans(&self, ctx: &ActionContext) -> Result<usize, InvokeError> {
        let orphans = self.ledger.orphaned_started()?;
        let mut completed = 0;
        for entry in orphans {
            let Some(name) = entry.payload.get("action").and_then(|v| v.as_str()) else {
                warn!(entry_id = entry.id, "started entry has no action name, skipping");
                continue;
            };
            let args = entry
                .payload
                .get("args")
                .cloned()
                .map(Value::from_json)
                .unwrap_or(Value::Null);
            let params = InvokeParams {
                name,
                args: &args,
                idempotency_key: &entry.idempotency_key,
                source: "replay",
                def_id: &entry.def_id,
            };
            // The capture step already ran before the crash; invoke with
            // the captured payload as-is.
            match self.invoke(ctx, params) {
                Ok(()) => completed += 1,
                Err(err) => {
                    warn!(action = name, key = entry.idempotency_key, error = %err, "orphan replay failed");
                }
            }
        }
        Ok(completed)
    }

    fn record_completion(&self, params: &InvokeParams<'_>) {
        if params.idempotency_key.is_empty() {
            return;
        }
        let payload = serde_json::json!({ "action": params.name });
        if let Err(err) = self.ledger.append(AppendParams {
            entry_type: LedgerEntryType::ActionCompleted,
            timestamp: self.clock.epoch_secs(),
            payload: &payload,
            source: params.source,
            idempotency_key: params.idempotency_key,
            def_id: params.def_id,
        }) {
            warn!(action = params.name, error = %err, "recording completion failed");
        }
    }

    fn record_failure(&self, params: &InvokeParams<'_>, failure: &InvokeError) {
        if params.idempotency_key.is_empty() {
            return;
        }
        let payload =
            serde_json::json!({ "action": params.name, "error": failure.to_string() });
        if let Err(err) = self.ledger.append(AppendParams {
            entry_type: LedgerEntryType::ActionFailed,
            timestamp: self.clock.epoch_secs(),
            payload: &payload,
            source: params.source,
            idempotency_key: params.idempotency_key,
            def_id: params.def_id,
        }) {
            warn!(action = params.name, error = %err, "recording failure failed");
        }
    }
}

#[cfg(test)]
#[path = "invoke_tests.rs"]
mod tests;

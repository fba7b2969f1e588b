// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kind-agnostic reconciliation orchestrator.
//!
//! The loop wakes on a periodic tick, a debounced manual trigger, or a
//! per-resource trigger, then runs one pass: ask each provider for its
//! dirty resources, fold in explicitly pended ones, and step each
//! resource's FSM until done. A resource's last-seen version only
//! advances after a successful terminal step, so transient failures are
//! retried on the next pass.

mod group;
mod light;
mod ratelimit;

pub use group::{determine_group_action, GroupAction, GroupApplier, GroupProvider, GroupResource};
pub use light::{LightApplier, LightProvider, LightResource};
pub use ratelimit::RateLimiter;

use async_trait::async_trait;
use lume_core::{Kind, ResourceKey};
use lume_storage::StorageError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("bridge error: {0}")]
    Bridge(String),
    #[error("unknown scene '{0}'")]
    UnknownScene(String),
    #[error("cancelled")]
    Cancelled,
}

/// A reconcilable entity with loaded desired/actual state.
#[async_trait]
pub trait Resource: Send {
    fn key(&self) -> ResourceKey;

    /// Read desired and actual state into the resource.
    async fn load(&mut self) -> Result<(), ReconcileError>;

    /// Pure predicate over loaded state.
    fn needs_reconcile(&self) -> bool;

    /// One FSM transition. Returns `true` when the resource needs no
    /// further steps this pass.
    async fn reconcile_step(&mut self) -> Result<bool, ReconcileError>;

    /// Version of the desired state that was loaded.
    fn desired_version(&self) -> i64;
}

/// Source of resources for one kind.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> Kind;

    /// Resources whose stored version exceeds the caller's last-seen one.
    fn list_dirty(
        &self,
        last_versions: &HashMap<String, i64>,
    ) -> Result<Vec<Box<dyn Resource>>, ReconcileError>;

    /// A single resource by id, regardless of version.
    fn get(&self, id: &str) -> Result<Box<dyn Resource>, ReconcileError>;

    fn list_all_ids(&self) -> Result<Vec<String>, ReconcileError>;

    /// Drop any cached lookups (scene ids, ...).
    fn clear_caches(&self);
}

/// Loop timing and rate limits.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Periodic full pass; `None` disables the ticker.
    pub periodic_interval: Option<Duration>,
    /// Collapse window for manual triggers. Zero runs passes immediately.
    pub debounce: Duration,
    /// Outbound bridge requests per second; 0 = unlimited.
    pub rate_limit_rps: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            periodic_interval: Some(Duration::from_secs(60)),
            debounce: Duration::from_millis(250),
            rate_limit_rps: 10.0,
        }
    }
}

struct TriggerState {
    pending: Mutex<HashSet<ResourceKey>>,
    notify: Notify,
}

/// Cheap handle for requesting reconciliation from other components.
#[derive(Clone)]
pub struct ReconcileHandle {
    state: Arc<TriggerState>,
}

impl ReconcileHandle {
    /// A handle wired to nothing. Used when the reconciler is disabled
    /// by configuration; triggers become no-ops.
    pub fn detached() -> Self {
        Self {
            state: Arc::new(TriggerState {
                pending: Mutex::new(HashSet::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Request a debounced pass over everything dirty.
    pub fn trigger(&self) {
        self.state.notify.notify_one();
    }

    /// Guarantee `key` is reconciled on the next pass even if its stored
    /// version has not moved, then request a pass.
    pub fn trigger_resource(&self, key: ResourceKey) {
        self.state.pending.lock().insert(key);
        self.state.notify.notify_one();
    }
}

/// The reconciliation loop.
pub struct Orchestrator {
    providers: Vec<Arc<dyn Provider>>,
    config: OrchestratorConfig,
    limiter: RateLimiter,
    last_versions: Mutex<HashMap<Kind, HashMap<String, i64>>>,
    trigger: Arc<TriggerState>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, providers: Vec<Arc<dyn Provider>>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_rps);
        Self {
            providers,
            config,
            limiter,
            last_versions: Mutex::new(HashMap::new()),
            trigger: Arc::new(TriggerState {
                pending: Mutex::new(HashSet::new()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn handle(&self) -> ReconcileHandle {
        ReconcileHandle { state: Arc::clone(&self.trigger) }
    }

    /// Run until cancelled. Wakes on the periodic tick and on triggers;
    /// triggers within the debounce window collapse into one pass.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            periodic = ?self.config.periodic_interval,
            debounce_ms = self.config.debounce.as_millis() as u64,
            "reconciliation orchestrator started"
        );
        loop {
            let triggered = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.trigger.notify.notified() => true,
                _ = periodic_sleep(self.config.periodic_interval) => false,
            };

            if triggered && !self.config.debounce.is_zero() {
                // Keep extending the quiet window while triggers arrive
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = self.trigger.notify.notified() => continue,
                        _ = tokio::time::sleep(self.config.debounce) => break,
                    }
                }
            }

            if let Err(err) = self.reconcile_all(&cancel).await {
                warn!(error = %err, "reconciliation pass failed");
            }
        }
        info!("reconciliation orchestrator stopped");
    }

    /// One pass over all dirty and pended resources.
    pub async fn reconcile_all(&self, cancel: &CancellationToken) -> Result<(), ReconcileError> {
        let pending: Vec<ResourceKey> = {
            let mut set = self.trigger.pending.lock();
            set.drain().collect()
        };

        for provider in &self.providers {
            let kind = provider.kind();
            let last = self.last_versions.lock().get(&kind).cloned().unwrap_or_default();

            let mut resources = provider.list_dirty(&last)?;
            let dirty_ids: HashSet<String> =
                resources.iter().map(|r| r.key().id.clone()).collect();
            for key in pending.iter().filter(|k| k.kind == kind) {
                if !dirty_ids.contains(&key.id) {
                    resources.push(provider.get(&key.id)?);
                }
            }

            for mut resource in resources {
                if cancel.is_cancelled() {
                    return Err(ReconcileError::Cancelled);
                }
                match self.reconcile_one(resource.as_mut(), cancel).await {
                    Ok(version) => {
                        let key = resource.key();
                        self.last_versions
                            .lock()
                            .entry(kind)
                            .or_default()
                            .insert(key.id, version);
                    }
                    Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                    Err(err) => {
                        // Leave last_versions untouched; the next pass retries
                        warn!(key = %resource.key(), error = %err, "resource reconciliation failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Step one resource to completion. Returns the desired version to
    /// record as seen.
    async fn reconcile_one(
        &self,
        resource: &mut dyn Resource,
        cancel: &CancellationToken,
    ) -> Result<i64, ReconcileError> {
        loop {
            self.limiter.wait(cancel).await?;
            resource.load().await?;
            if !resource.needs_reconcile() {
                debug!(key = %resource.key(), "already converged");
                return Ok(resource.desired_version());
            }
            let done = resource.reconcile_step().await?;
            debug!(key = %resource.key(), done, "reconcile step");
            if done {
                return Ok(resource.desired_version());
            }
        }
    }
}

async fn periodic_sleep(interval: Option<Duration>) {
    match interval {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

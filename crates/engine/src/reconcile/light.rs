// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-light reconciliation.
//!
//! Simpler than groups: no scenes. OFF to ON goes out as one composite
//! PUT carrying power plus every specified field; ON to ON sends only
//! the fields that differ from actual, with xy compared under tolerance.

use super::{Provider, ReconcileError, Resource};
use async_trait::async_trait;
use lume_core::{xy_within_tolerance, Kind, LightActual, LightDesired, ResourceKey};
use lume_storage::TypedStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Side-effect interface for light PUTs.
#[async_trait]
pub trait LightApplier: Send + Sync {
    async fn light_actual(&self, id: &str) -> Result<LightActual, ReconcileError>;

    /// Composite PUT: power on plus all specified fields.
    async fn turn_on_with_state(&self, id: &str, patch: &LightDesired)
        -> Result<(), ReconcileError>;

    async fn turn_off(&self, id: &str) -> Result<(), ReconcileError>;

    /// Property-delta PUT while the light is already on.
    async fn apply_delta(&self, id: &str, delta: &LightDesired) -> Result<(), ReconcileError>;

    fn clear_caches(&self) {}
}

/// Specified fields that differ from actual.
fn property_delta(desired: &LightDesired, actual: &LightActual) -> LightDesired {
    LightDesired {
        power: None,
        bri: desired.bri.filter(|want| actual.bri != Some(*want)),
        hue: desired.hue.filter(|want| actual.hue != Some(*want)),
        sat: desired.sat.filter(|want| actual.sat != Some(*want)),
        xy: desired
            .xy
            .filter(|want| !actual.xy.is_some_and(|have| xy_within_tolerance(*want, have))),
        ct: desired.ct.filter(|want| actual.ct != Some(*want)),
    }
}

/// A light under reconciliation.
pub struct LightResource {
    id: String,
    store: TypedStore<LightDesired>,
    applier: Arc<dyn LightApplier>,
    desired: LightDesired,
    version: i64,
    actual: LightActual,
}

impl LightResource {
    pub fn new(id: String, store: TypedStore<LightDesired>, applier: Arc<dyn LightApplier>) -> Self {
        Self {
            id,
            store,
            applier,
            desired: LightDesired::default(),
            version: 0,
            actual: LightActual::default(),
        }
    }

    fn wants_off(&self) -> bool {
        self.desired.power == Some(false) && self.actual.on
    }

    fn wants_on(&self) -> bool {
        self.desired.power == Some(true) && !self.actual.on
    }

    fn delta_while_on(&self) -> Option<LightDesired> {
        if !self.actual.on || self.desired.power == Some(false) {
            return None;
        }
        let delta = property_delta(&self.desired, &self.actual);
        delta.has_state_fields().then_some(delta)
    }
}

#[async_trait]
impl Resource for LightResource {
    fn key(&self) -> ResourceKey {
        ResourceKey::light(self.id.clone())
    }

    async fn load(&mut self) -> Result<(), ReconcileError> {
        let (desired, version) = self.store.get(&self.id)?.unwrap_or_default();
        self.desired = desired;
        self.version = version;
        self.actual = self.applier.light_actual(&self.id).await?;
        Ok(())
    }

    fn needs_reconcile(&self) -> bool {
        self.wants_off() || self.wants_on() || self.delta_while_on().is_some()
    }

    async fn reconcile_step(&mut self) -> Result<bool, ReconcileError> {
        if self.wants_off() {
            self.applier.turn_off(&self.id).await?;
        } else if self.wants_on() {
            let patch = LightDesired { power: Some(true), ..self.desired.clone() };
            self.applier.turn_on_with_state(&self.id, &patch).await?;
        } else if let Some(delta) = self.delta_while_on() {
            self.applier.apply_delta(&self.id, &delta).await?;
        }
        Ok(true)
    }

    fn desired_version(&self) -> i64 {
        self.version
    }
}

/// Provider exposing lights to the orchestrator.
pub struct LightProvider {
    store: TypedStore<LightDesired>,
    applier: Arc<dyn LightApplier>,
}

impl LightProvider {
    pub fn new(store: TypedStore<LightDesired>, applier: Arc<dyn LightApplier>) -> Self {
        Self { store, applier }
    }

    fn make(&self, id: String) -> Box<dyn Resource> {
        Box::new(LightResource::new(id, self.store.clone(), Arc::clone(&self.applier)))
    }
}

#[async_trait]
impl Provider for LightProvider {
    fn kind(&self) -> Kind {
        Kind::Light
    }

    fn list_dirty(
        &self,
        last_versions: &HashMap<String, i64>,
    ) -> Result<Vec<Box<dyn Resource>>, ReconcileError> {
        let ids = self.store.get_dirty(last_versions)?;
        Ok(ids.into_iter().map(|id| self.make(id)).collect())
    }

    fn get(&self, id: &str) -> Result<Box<dyn Resource>, ReconcileError> {
        Ok(self.make(id.to_string()))
    }

    fn list_all_ids(&self) -> Result<Vec<String>, ReconcileError> {
        Ok(self.store.get_all()?.into_iter().map(|(id, _, _)| id).collect())
    }

    fn clear_caches(&self) {
        self.applier.clear_caches();
    }
}

#[cfg(test)]
#[path = "light_tests.rs"]
mod tests;

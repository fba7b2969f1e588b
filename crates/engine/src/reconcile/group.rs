// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group reconciliation: pure FSM plus the applier that realizes it.
//!
//! Scene priority is deliberate: while the group is on, a non-empty
//! desired scene always wins over color properties and is reapplied on
//! every pass that sees it (idempotent at the bridge). Which scene is
//! currently active is never cached; the bridge is the source of truth.

use super::{Provider, ReconcileError, Resource};
use async_trait::async_trait;
use lume_core::{GroupActual, GroupDesired, Kind, ResourceKey};
use lume_storage::TypedStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Decision of one group FSM evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    None,
    TurnOff,
    ApplyScene(String),
    ApplyState,
    TurnOnWithScene(String),
    TurnOnWithState,
}

/// Pure mapping from (desired, actual) to the next action.
pub fn determine_group_action(desired: &GroupDesired, actual: &GroupActual) -> GroupAction {
    if actual.any_on {
        if desired.power == Some(false) {
            return GroupAction::TurnOff;
        }
        if let Some(scene) = desired.scene() {
            return GroupAction::ApplyScene(scene.to_string());
        }
        if desired.has_state_fields() {
            return GroupAction::ApplyState;
        }
        GroupAction::None
    } else {
        if desired.power != Some(true) {
            return GroupAction::None;
        }
        if let Some(scene) = desired.scene() {
            return GroupAction::TurnOnWithScene(scene.to_string());
        }
        if desired.has_state_fields() {
            return GroupAction::TurnOnWithState;
        }
        // Nothing to apply: turning on with no opinion is a no-op
        GroupAction::None
    }
}

/// Side-effect interface realizing group FSM decisions on the bridge.
#[async_trait]
pub trait GroupApplier: Send + Sync {
    async fn group_actual(&self, id: &str) -> Result<GroupActual, ReconcileError>;

    async fn turn_on_with_scene(&self, id: &str, scene: &str) -> Result<(), ReconcileError>;

    async fn apply_scene(&self, id: &str, scene: &str) -> Result<(), ReconcileError>;

    /// PUT a composite state patch containing only the set fields.
    async fn apply_state(&self, id: &str, patch: &GroupDesired) -> Result<(), ReconcileError>;

    async fn turn_off(&self, id: &str) -> Result<(), ReconcileError>;

    /// Drop cached lookups (scene name -> id).
    fn clear_caches(&self) {}
}

/// A group under reconciliation.
pub struct GroupResource {
    id: String,
    store: TypedStore<GroupDesired>,
    applier: Arc<dyn GroupApplier>,
    desired: GroupDesired,
    version: i64,
    actual: GroupActual,
}

impl GroupResource {
    pub fn new(id: String, store: TypedStore<GroupDesired>, applier: Arc<dyn GroupApplier>) -> Self {
        Self {
            id,
            store,
            applier,
            desired: GroupDesired::default(),
            version: 0,
            actual: GroupActual::default(),
        }
    }

    /// Composite patch for ApplyState / TurnOnWithState: set fields only,
    /// with power included when turning on.
    fn state_patch(&self, with_power: bool) -> GroupDesired {
        GroupDesired {
            power: if with_power { Some(true) } else { None },
            scene_name: None,
            bri: self.desired.bri,
            hue: self.desired.hue,
            sat: self.desired.sat,
            xy: self.desired.xy,
            ct: self.desired.ct,
        }
    }
}

#[async_trait]
impl Resource for GroupResource {
    fn key(&self) -> ResourceKey {
        ResourceKey::group(self.id.clone())
    }

    async fn load(&mut self) -> Result<(), ReconcileError> {
        let (desired, version) = self.store.get(&self.id)?.unwrap_or_default();
        self.desired = desired;
        self.version = version;
        self.actual = self.applier.group_actual(&self.id).await?;
        Ok(())
    }

    fn needs_reconcile(&self) -> bool {
        determine_group_action(&self.desired, &self.actual) != GroupAction::None
    }

    async fn reconcile_step(&mut self) -> Result<bool, ReconcileError> {
        match determine_group_action(&self.desired, &self.actual) {
            GroupAction::None => {}
            GroupAction::TurnOff => self.applier.turn_off(&self.id).await?,
            GroupAction::TurnOnWithScene(scene) => {
                self.applier.turn_on_with_scene(&self.id, &scene).await?
            }
            GroupAction::ApplyScene(scene) => self.applier.apply_scene(&self.id, &scene).await?,
            GroupAction::TurnOnWithState => {
                let patch = self.state_patch(true);
                self.applier.apply_state(&self.id, &patch).await?
            }
            GroupAction::ApplyState => {
                let patch = self.state_patch(false);
                self.applier.apply_state(&self.id, &patch).await?
            }
        }
        Ok(true)
    }

    fn desired_version(&self) -> i64 {
        self.version
    }
}

/// Provider exposing groups to the orchestrator.
pub struct GroupProvider {
    store: TypedStore<GroupDesired>,
    applier: Arc<dyn GroupApplier>,
}

impl GroupProvider {
    pub fn new(store: TypedStore<GroupDesired>, applier: Arc<dyn GroupApplier>) -> Self {
        Self { store, applier }
    }

    fn make(&self, id: String) -> Box<dyn Resource> {
        Box::new(GroupResource::new(id, self.store.clone(), Arc::clone(&self.applier)))
    }
}

#[async_trait]
impl Provider for GroupProvider {
    fn kind(&self) -> Kind {
        Kind::Group
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
#[path = "group_tests.rs"]
mod tests;

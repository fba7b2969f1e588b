// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chainable desired-state builders.
//!
//! A builder stages a partial state record; nothing touches the store
//! until the staged changes flush, either when the owning action
//! completes or when the script calls `reconcile` explicitly. Flushing
//! merges the
//! patch into the stored record field by field, which is safe because
//! all flushes happen on the script host's single worker.

use lume_core::{GroupDesired, LightDesired, ResourceKey};
use parking_lot::Mutex;
use std::sync::Arc;

/// One staged patch awaiting flush.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedChange {
    Group { id: String, patch: GroupDesired },
    Light { id: String, patch: LightDesired },
}

impl StagedChange {
    pub fn key(&self) -> ResourceKey {
        match self {
            StagedChange::Group { id, .. } => ResourceKey::group(id.clone()),
            StagedChange::Light { id, .. } => ResourceKey::light(id.clone()),
        }
    }
}

/// Shared registry of staged changes for one action invocation.
#[derive(Clone, Default)]
pub struct PendingChanges {
    staged: Arc<Mutex<Vec<StagedChange>>>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, change: StagedChange) {
        self.staged.lock().push(change);
    }

    /// Take everything staged so far, leaving the registry empty.
    pub fn take(&self) -> Vec<StagedChange> {
        std::mem::take(&mut *self.staged.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.staged.lock().is_empty()
    }
}

/// Stages a partial [`GroupDesired`] for one group.
pub struct GroupStateBuilder {
    id: String,
    patch: GroupDesired,
    pending: PendingChanges,
}

impl GroupStateBuilder {
    pub fn new(id: impl Into<String>, pending: PendingChanges) -> Self {
        Self { id: id.into(), patch: GroupDesired::default(), pending }
    }

    pub fn power(mut self, on: bool) -> Self {
        self.patch.power = Some(on);
        self
    }

    pub fn scene(mut self, name: impl Into<String>) -> Self {
        self.patch.scene_name = Some(name.into());
        self
    }

    pub fn brightness(mut self, bri: u8) -> Self {
        self.patch.bri = Some(bri.clamp(1, 254));
        self
    }

    pub fn hue(mut self, hue: u16) -> Self {
        self.patch.hue = Some(hue);
        self
    }

    pub fn saturation(mut self, sat: u8) -> Self {
        self.patch.sat = Some(sat.min(254));
        self
    }

    pub fn xy(mut self, x: f32, y: f32) -> Self {
        self.patch.xy = Some([x, y]);
        self
    }

    pub fn color_temp(mut self, mirek: u16) -> Self {
        self.patch.ct = Some(mirek.clamp(153, 500));
        self
    }

    /// Register the accumulated patch for flush.
    pub fn stage(self) {
        self.pending.stage(StagedChange::Group { id: self.id, patch: self.patch });
    }
}

/// Stages a partial [`LightDesired`] for one light.
pub struct LightStateBuilder {
    id: String,
    patch: LightDesired,
    pending: PendingChanges,
}

impl LightStateBuilder {
    pub fn new(id: impl Into<String>, pending: PendingChanges) -> Self {
        Self { id: id.into(), patch: LightDesired::default(), pending }
    }

    pub fn power(mut self, on: bool) -> Self {
        self.patch.power = Some(on);
        self
    }

    pub fn brightness(mut self, bri: u8) -> Self {
        self.patch.bri = Some(bri.clamp(1, 254));
        self
    }

    pub fn hue(mut self, hue: u16) -> Self {
        self.patch.hue = Some(hue);
        self
    }

    pub fn saturation(mut self, sat: u8) -> Self {
        self.patch.sat = Some(sat.min(254));
        self
    }

    pub fn xy(mut self, x: f32, y: f32) -> Self {
        self.patch.xy = Some([x, y]);
        self
    }

    pub fn color_temp(mut self, mirek: u16) -> Self {
        self.patch.ct = Some(mirek.clamp(153, 500));
        self
    }

    pub fn stage(self) {
        self.pending.stage(StagedChange::Light { id: self.id, patch: self.patch });
    }
}

/// Merge a staged group patch into a stored record.
pub(crate) fn merge_group(mut current: GroupDesired, patch: &GroupDesired) -> GroupDesired {
    if let Some(v) = patch.power {
        current.power = Some(v);
    }
    if let Some(ref v) = patch.scene_name {
        current.scene_name = Some(v.clone());
    }
    if let Some(v) = patch.bri {
        current.bri = Some(v);
    }
    if let Some(v) = patch.hue {
        current.hue = Some(v);
    }
    if let Some(v) = patch.sat {
        current.sat = Some(v);
    }
    if let Some(v) = patch.xy {
        current.xy = Some(v);
    }
    if let Some(v) = patch.ct {
        current.ct = Some(v);
    }
    current
}

/// Merge a staged light patch into a stored record.
pub(crate) fn merge_light(mut current: LightDesired, patch: &LightDesired) -> LightDesired {
    if let Some(v) = patch.power {
        current.power = Some(v);
    }
    if let Some(v) = patch.bri {
        current.bri = Some(v);
    }
    if let Some(v) = patch.hue {
        current.hue = Some(v);
    }
    if let Some(v) = patch.sat {
        current.sat = Some(v);
    }
    if let Some(v) = patch.xy {
        current.xy = Some(v);
    }
    if let Some(v) = patch.ct {
        current.ct = Some(v);
    }
    current
}

#[cfg(test)]
#[path = "builders_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named actions registered by user scripts

use crate::invoke::{ActionContext, InvokeError};
use lume_core::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The effectful body of an action.
pub type ExecuteFn = Arc<dyn Fn(&ActionContext, &Value) -> Result<(), InvokeError> + Send + Sync>;

/// Reads at-fire-time inputs that must replay identically after a crash.
/// The returned value is persisted with the `action_started` ledger entry
/// and handed to `execute` verbatim, so it must be self-contained.
pub type CaptureFn =
    Arc<dyn Fn(&ActionContext, &Value) -> Result<Value, InvokeError> + Send + Sync>;

/// A named unit of work exposed to scripts.
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub capture: Option<CaptureFn>,
    pub execute: ExecuteFn,
}

impl Action {
    pub fn new(name: impl Into<String>, execute: ExecuteFn) -> Self {
        Self { name: name.into(), capture: None, execute }
    }

    /// Stateful variant: `capture` runs before `execute` and its result
    /// is what replays on restart.
    pub fn stateful(name: impl Into<String>, capture: CaptureFn, execute: ExecuteFn) -> Self {
        Self { name: name.into(), capture: Some(capture), execute }
    }
}

/// Name -> action map. Registration happens once at script load;
/// lookups happen on every invocation.
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Arc<Action>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, action: Action) -> Result<(), InvokeError> {
        let mut actions = self.actions.write();
        if actions.contains_key(&action.name) {
            return Err(InvokeError::DuplicateAction(action.name));
        }
        actions.insert(action.name.clone(), Arc::new(action));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus event types for the lume system

use crate::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag routing an event to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Physical button press from a bridge input device
    Button,
    /// Relative rotary dial movement
    Rotary,
    /// Zigbee connectivity change for a device
    Connectivity,
    /// Scheduler occurrence firing
    Schedule,
    /// Inbound HTTP webhook
    Webhook,
    /// Light or grouped-light state change reported by the bridge
    LightChange,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Button => "button",
            EventType::Rotary => "rotary",
            EventType::Connectivity => "connectivity",
            EventType::Schedule => "schedule",
            EventType::Webhook => "webhook",
            EventType::LightChange => "light_change",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event flowing through the bus.
///
/// `data` is a free-form map; each producer documents the keys it sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: ValueMap,
}

impl BusEvent {
    pub fn new(event_type: EventType, data: ValueMap) -> Self {
        Self { event_type, data }
    }

    /// Key lookup in the event payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Button press. `event_id` dedupes redelivered bridge reports.
    pub fn button(resource_id: &str, action: &str, event_id: &str) -> Self {
        let mut data = ValueMap::new();
        data.insert("resource_id".into(), resource_id.into());
        data.insert("action".into(), action.into());
        data.insert("event_id".into(), event_id.into());
        Self::new(EventType::Button, data)
    }

    /// Relative rotary movement.
    pub fn rotary(
        resource_id: &str,
        action: &str,
        direction: &str,
        steps: i64,
        duration_ms: i64,
        event_id: &str,
    ) -> Self {
        let mut data = ValueMap::new();
        data.insert("resource_id".into(), resource_id.into());
        data.insert("action".into(), action.into());
        data.insert("direction".into(), direction.into());
        data.insert("steps".into(), steps.into());
        data.insert("duration".into(), duration_ms.into());
        data.insert("event_id".into(), event_id.into());
        Self::new(EventType::Rotary, data)
    }

    /// Zigbee connectivity change.
    pub fn connectivity(device_id: &str, status: &str) -> Self {
        let mut data = ValueMap::new();
        data.insert("device_id".into(), device_id.into());
        data.insert("status".into(), status.into());
        Self::new(EventType::Connectivity, data)
    }

    /// Scheduler firing. The handler invokes `action_name` with
    /// `occurrence_id` as the idempotency key.
    pub fn schedule(
        action_name: &str,
        action_args: Value,
        occurrence_id: &str,
        schedule_id: &str,
    ) -> Self {
        let mut data = ValueMap::new();
        data.insert("action_name".into(), action_name.into());
        data.insert("action_args".into(), action_args);
        data.insert("occurrence_id".into(), occurrence_id.into());
        data.insert("schedule_id".into(), schedule_id.into());
        data.insert("source".into(), "scheduler".into());
        Self::new(EventType::Schedule, data)
    }

    /// Light or grouped-light change, payload assembled by the SSE reader.
    pub fn light_change(data: ValueMap) -> Self {
        Self::new(EventType::LightChange, data)
    }

    /// Inbound webhook, payload assembled by the receiver.
    pub fn webhook(data: ValueMap) -> Self {
        Self::new(EventType::Webhook, data)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

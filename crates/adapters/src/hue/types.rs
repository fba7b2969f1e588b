// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the bridge REST API (v1) and event stream (v2)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- v1 REST responses ---

#[derive(Debug, Clone, Deserialize)]
pub struct GroupResponse {
    #[serde(default)]
    pub name: String,
    pub state: GroupStateWire,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupStateWire {
    #[serde(default)]
    pub any_on: bool,
    #[serde(default)]
    pub all_on: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightResponse {
    #[serde(default)]
    pub name: String,
    pub state: LightStateWire,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LightStateWire {
    #[serde(default)]
    pub on: bool,
    #[serde(default)]
    pub bri: Option<u8>,
    #[serde(default)]
    pub hue: Option<u16>,
    #[serde(default)]
    pub sat: Option<u8>,
    #[serde(default)]
    pub xy: Option<[f32; 2]>,
    #[serde(default)]
    pub ct: Option<u16>,
}

/// Body for `PUT lights/{id}/state` and `PUT groups/{id}/action`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    /// Scene activation rides on the group action body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
}

/// One entry of `GET scenes` (map of id -> summary).
#[derive(Debug, Clone, Deserialize)]
pub struct SceneSummary {
    pub name: String,
    /// Group the scene belongs to, when it is a GroupScene
    #[serde(default)]
    pub group: Option<String>,
}

pub type SceneMap = HashMap<String, SceneSummary>;

// --- v2 event stream payloads ---

/// Top-level envelope of one SSE frame body: an array of these.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub creationtime: String,
    #[serde(default)]
    pub data: Vec<EventItem>,
}

/// One typed resource update inside an envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventItem {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(default)]
    pub button: Option<ButtonUpdate>,
    #[serde(default)]
    pub relative_rotary: Option<RelativeRotaryUpdate>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub on: Option<OnState>,
    #[serde(default)]
    pub dimming: Option<Dimming>,
    #[serde(default)]
    pub color_temperature: Option<ColorTemperature>,
    #[serde(default)]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub rtype: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonUpdate {
    pub button_report: Option<ButtonReport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonReport {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub updated: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelativeRotaryUpdate {
    pub last_event: Option<RotaryEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotaryEvent {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub rotation: Option<Rotation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rotation {
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub steps: i64,
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnState {
    #[serde(default)]
    pub on: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dimming {
    #[serde(default)]
    pub brightness: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorTemperature {
    #[serde(default)]
    pub mirek: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Color {
    #[serde(default)]
    pub xy: Option<Xy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Xy {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

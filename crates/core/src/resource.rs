// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconcilable resource kinds and their desired/actual state shapes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-component tolerance for CIE xy comparisons. The bridge rounds
/// coordinates on write, so exact equality never converges.
pub const XY_TOLERANCE: f32 = 0.001;

/// Resource kind handled by the reconciliation orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Group,
    Light,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Group => "group",
            Kind::Light => "light",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(Kind::Group),
            "light" => Ok(Kind::Light),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Identity of a reconcilable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: Kind,
    pub id: String,
}

impl ResourceKey {
    pub fn new(kind: Kind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::new(Kind::Group, id)
    }

    pub fn light(id: impl Into<String>) -> Self {
        Self::new(Kind::Light, id)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Desired state for a light group. Absent fields mean "no opinion".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupDesired {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_name: Option<String>,
    /// Brightness 1..=254
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    /// Saturation 0..=254
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f32; 2]>,
    /// Color temperature in mirek, 153..=500
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

impl GroupDesired {
    /// True when any color/brightness property is set.
    pub fn has_state_fields(&self) -> bool {
        self.bri.is_some()
            || self.hue.is_some()
            || self.sat.is_some()
            || self.xy.is_some()
            || self.ct.is_some()
    }

    pub fn scene(&self) -> Option<&str> {
        self.scene_name.as_deref().filter(|s| !s.is_empty())
    }
}

/// Actual state of a group as read from the bridge.
///
/// Scene membership is intentionally not tracked; the bridge is the sole
/// source of truth for which scene is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupActual {
    pub any_on: bool,
    pub all_on: bool,
}

/// Desired state for a single light. Absent fields mean "no opinion".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightDesired {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

impl LightDesired {
    /// True when any color/brightness property is set.
    pub fn has_state_fields(&self) -> bool {
        self.bri.is_some()
            || self.hue.is_some()
            || self.sat.is_some()
            || self.xy.is_some()
            || self.ct.is_some()
    }
}

/// Actual state of a light as read from the bridge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightActual {
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

/// Compare CIE xy coordinates within [`XY_TOLERANCE`] per component.
pub fn xy_within_tolerance(a: [f32; 2], b: [f32; 2]) -> bool {
    (a[0] - b[0]).abs() <= XY_TOLERANCE && (a[1] - b[1]).abs() <= XY_TOLERANCE
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn kind_string_roundtrip() {
    assert_eq!(Kind::Group.as_str(), "group");
    assert_eq!("light".parse::<Kind>().unwrap(), Kind::Light);
    assert!("scene".parse::<Kind>().is_err());
}

#[test]
fn resource_key_display() {
    assert_eq!(ResourceKey::group("5").to_string(), "group/5");
    assert_eq!(ResourceKey::light("bulb-1").to_string(), "light/bulb-1");
}

#[test]
fn group_desired_omits_absent_fields() {
    let desired = GroupDesired { power: Some(true), ..Default::default() };
    let json = serde_json::to_string(&desired).unwrap();
    assert_eq!(json, r#"{"power":true}"#);
}

#[test]
fn group_desired_roundtrip_with_fields() {
    let desired = GroupDesired {
        power: Some(true),
        scene_name: Some("Relax".to_string()),
        bri: Some(200),
        xy: Some([0.4, 0.5]),
        ..Default::default()
    };
    let json = serde_json::to_string(&desired).unwrap();
    let parsed: GroupDesired = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, desired);
}

#[yare::parameterized(
    empty = { GroupDesired::default(), false },
    power_only = { GroupDesired { power: Some(true), ..Default::default() }, false },
    scene_only = { GroupDesired { scene_name: Some("s".into()), ..Default::default() }, false },
    bri = { GroupDesired { bri: Some(100), ..Default::default() }, true },
    ct = { GroupDesired { ct: Some(300), ..Default::default() }, true },
    xy = { GroupDesired { xy: Some([0.1, 0.2]), ..Default::default() }, true },
)]
fn group_state_field_presence(desired: GroupDesired, expected: bool) {
    assert_eq!(desired.has_state_fields(), expected);
}

#[test]
fn empty_scene_name_reads_as_no_scene() {
    let desired = GroupDesired { scene_name: Some(String::new()), ..Default::default() };
    assert_eq!(desired.scene(), None);
    let desired = GroupDesired { scene_name: Some("Relax".into()), ..Default::default() };
    assert_eq!(desired.scene(), Some("Relax"));
}

#[yare::parameterized(
    equal       = { [0.5, 0.5], [0.5, 0.5], true },
    within      = { [0.5, 0.5], [0.5005, 0.4995], true },
    at_edge     = { [0.5, 0.5], [0.501, 0.5], true },
    beyond_x    = { [0.5, 0.5], [0.502, 0.5], false },
    beyond_y    = { [0.5, 0.5], [0.5, 0.498], false },
)]
fn xy_tolerance_comparison(a: [f32; 2], b: [f32; 2], expected: bool) {
    assert_eq!(xy_within_tolerance(a, b), expected);
}

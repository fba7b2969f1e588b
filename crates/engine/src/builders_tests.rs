// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn group_builder_accumulates_chained_fields() {
    let pending = PendingChanges::new();
    GroupStateBuilder::new("5", pending.clone())
        .power(true)
        .scene("Relax")
        .brightness(200)
        .stage();

    let staged = pending.take();
    assert_eq!(staged.len(), 1);
    let StagedChange::Group { id, patch } = &staged[0] else {
        panic!("expected a group change");
    };
    assert_eq!(id, "5");
    assert_eq!(patch.power, Some(true));
    assert_eq!(patch.scene_name.as_deref(), Some("Relax"));
    assert_eq!(patch.bri, Some(200));
    assert_eq!(patch.hue, None);
}

#[test]
fn nothing_flushes_until_stage() {
    let pending = PendingChanges::new();
    let builder = GroupStateBuilder::new("5", pending.clone()).power(true);
    assert!(pending.is_empty());
    builder.stage();
    assert!(!pending.is_empty());
}

#[test]
fn take_empties_the_registry() {
    let pending = PendingChanges::new();
    LightStateBuilder::new("bulb", pending.clone()).power(false).stage();
    assert_eq!(pending.take().len(), 1);
    assert!(pending.take().is_empty());
}

#[test]
fn builder_clamps_ranges() {
    let pending = PendingChanges::new();
    GroupStateBuilder::new("5", pending.clone())
        .brightness(0)
        .saturation(255)
        .color_temp(100)
        .stage();
    let staged = pending.take();
    let StagedChange::Group { patch, .. } = &staged[0] else {
        panic!("expected a group change");
    };
    assert_eq!(patch.bri, Some(1));
    assert_eq!(patch.sat, Some(254));
    assert_eq!(patch.ct, Some(153));
}

#[test]
fn staged_change_key_carries_kind() {
    let pending = PendingChanges::new();
    GroupStateBuilder::new("5", pending.clone()).power(true).stage();
    LightStateBuilder::new("7", pending.clone()).power(true).stage();
    let staged = pending.take();
    assert_eq!(staged[0].key(), lume_core::ResourceKey::group("5"));
    assert_eq!(staged[1].key(), lume_core::ResourceKey::light("7"));
}

#[test]
fn merge_group_overlays_only_set_fields() {
    let current = GroupDesired {
        power: Some(true),
        scene_name: Some("Relax".into()),
        bri: Some(100),
        ..Default::default()
    };
    let patch = GroupDesired { bri: Some(200), ct: Some(300), ..Default::default() };
    let merged = merge_group(current, &patch);
    assert_eq!(merged.power, Some(true), "untouched field survives");
    assert_eq!(merged.scene_name.as_deref(), Some("Relax"));
    assert_eq!(merged.bri, Some(200), "patched field wins");
    assert_eq!(merged.ct, Some(300), "new field lands");
}

#[test]
fn merge_light_overlays_only_set_fields() {
    let current = LightDesired { power: Some(false), hue: Some(1000), ..Default::default() };
    let patch = LightDesired { power: Some(true), xy: Some([0.3, 0.3]), ..Default::default() };
    let merged = merge_light(current, &patch);
    assert_eq!(merged.power, Some(true));
    assert_eq!(merged.hue, Some(1000));
    assert_eq!(merged.xy, Some([0.3, 0.3]));
}

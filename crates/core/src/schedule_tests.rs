// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn misfire_policy_roundtrip() {
    assert_eq!("skip".parse::<MisfirePolicy>().unwrap(), MisfirePolicy::Skip);
    assert_eq!("run_latest".parse::<MisfirePolicy>().unwrap(), MisfirePolicy::RunLatest);
    assert!("replay_all".parse::<MisfirePolicy>().is_err());
    assert_eq!(MisfirePolicy::default(), MisfirePolicy::RunLatest);
}

#[test]
fn occurrence_id_format() {
    assert_eq!(occurrence_id("wake", 1700000000), "wake/1700000000");
}

#[test]
fn occurrence_id_parses_back() {
    let (def_id, run_at) = parse_occurrence_id("wake/1700000000").unwrap();
    assert_eq!(def_id, "wake");
    assert_eq!(run_at, 1700000000);
}

#[test]
fn occurrence_id_with_slashes_in_def_id() {
    // rsplit keeps everything before the last slash as the definition id
    let (def_id, run_at) = parse_occurrence_id("room/5/wake/1700000000").unwrap();
    assert_eq!(def_id, "room/5/wake");
    assert_eq!(run_at, 1700000000);
}

#[test]
fn occurrence_id_rejects_garbage() {
    assert!(parse_occurrence_id("no-slash").is_none());
    assert!(parse_occurrence_id("wake/not-a-number").is_none());
}

#[test]
fn definition_deserializes_with_defaults() {
    let def: ScheduleDefinition = serde_json::from_str(
        r#"{"id":"wake","time_expr":"07:00","action_name":"sceneA"}"#,
    )
    .unwrap();
    assert!(def.enabled);
    assert_eq!(def.misfire_policy, MisfirePolicy::RunLatest);
    assert!(def.action_args.is_null());
    assert_eq!(def.tag, "");
}

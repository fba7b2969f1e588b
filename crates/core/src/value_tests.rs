// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn serializes_as_plain_json() {
    let mut m = ValueMap::new();
    m.insert("on".to_string(), Value::Bool(true));
    m.insert("bri".to_string(), Value::Int(200));
    m.insert("name".to_string(), Value::String("kitchen".to_string()));
    let json = serde_json::to_string(&Value::Map(m)).unwrap();
    assert_eq!(json, r#"{"bri":200,"name":"kitchen","on":true}"#);
}

#[test]
fn deserializes_from_plain_json() {
    let v: Value = serde_json::from_str(r#"{"steps":3,"ratio":0.5,"dir":"up","x":null}"#).unwrap();
    assert_eq!(v.get("steps").and_then(Value::as_i64), Some(3));
    assert_eq!(v.get("ratio").and_then(Value::as_f64), Some(0.5));
    assert_eq!(v.get("dir").and_then(Value::as_str), Some("up"));
    assert!(v.get("x").is_some_and(Value::is_null));
}

#[test]
fn json_roundtrip_preserves_structure() {
    let json: serde_json::Value = serde_json::json!({
        "nested": {"list": [1, 2.5, "three", false, null]},
    });
    let value = Value::from_json(json.clone());
    assert_eq!(value.to_json(), json);
}

#[test]
fn as_f64_reads_ints() {
    assert_eq!(Value::Int(7).as_f64(), Some(7.0));
    assert_eq!(Value::Float(1.25).as_f64(), Some(1.25));
    assert_eq!(Value::String("7".into()).as_f64(), None);
}

#[test]
fn get_on_non_map_is_none() {
    assert!(Value::Int(1).get("key").is_none());
    assert!(Value::Null.get("key").is_none());
}

#[test]
fn into_map_wraps_scalars() {
    assert!(Value::Null.into_map().is_empty());
    let m = Value::Int(5).into_map();
    assert_eq!(m.get("value").and_then(Value::as_i64), Some(5));
}

#[test]
fn display_strings_are_bare() {
    assert_eq!(Value::String("hi".into()).to_string(), "hi");
    assert_eq!(Value::Int(3).to_string(), "3");
}

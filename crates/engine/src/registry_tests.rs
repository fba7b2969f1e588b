// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn noop_action(name: &str) -> Action {
    Action::new(name, Arc::new(|_, _| Ok(())))
}

#[test]
fn register_and_get() {
    let registry = ActionRegistry::new();
    registry.register(noop_action("lights_on")).unwrap();
    assert!(registry.get("lights_on").is_some());
    assert!(registry.get("lights_off").is_none());
}

#[test]
fn duplicate_registration_fails() {
    let registry = ActionRegistry::new();
    registry.register(noop_action("toggle")).unwrap();
    let err = registry.register(noop_action("toggle")).unwrap_err();
    assert!(matches!(err, InvokeError::DuplicateAction(name) if name == "toggle"));
}

#[test]
fn names_are_sorted() {
    let registry = ActionRegistry::new();
    registry.register(noop_action("zeta")).unwrap();
    registry.register(noop_action("alpha")).unwrap();
    assert_eq!(registry.names(), vec!["alpha".to_string(), "zeta".to_string()]);
}

#[test]
fn stateful_action_carries_capture() {
    let action = Action::stateful(
        "capture_me",
        Arc::new(|_, args| Ok(args.clone())),
        Arc::new(|_, _| Ok(())),
    );
    assert!(action.capture.is_some());
    assert!(noop_action("plain").capture.is_none());
}

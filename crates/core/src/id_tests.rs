// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn workflow_id_has_prefix_and_fixed_length() {
    let id = WorkflowId::new();
    assert!(id.as_str().starts_with("wf--"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn workflow_ids_are_unique() {
    let a = WorkflowId::new();
    let b = WorkflowId::new();
    assert_ne!(a, b);
}

#[test]
fn suffix_strips_prefix() {
    let id = WorkflowId::from_string("wf--abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn short_truncates_suffix() {
    let id = WorkflowId::from_string("wf--abcdefghij");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefghij");
}

#[test]
fn from_string_round_trips_display() {
    let id = WorkflowId::from_string("wf--roundtrip");
    assert_eq!(format!("{id}"), "wf--roundtrip");
}

#[test]
fn id_buf_borrow_matches_str_hash() {
    use std::collections::HashMap;
    let mut map: HashMap<WorkflowId, u32> = HashMap::new();
    let id = WorkflowId::from_string("wf--lookup");
    map.insert(id, 7);
    assert_eq!(map.get("wf--lookup"), Some(&7));
}

#[test]
fn serde_is_transparent() {
    let id = WorkflowId::from_string("wf--serde");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"wf--serde\"");
    let back: WorkflowId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn deserialize_rejects_oversized() {
    let too_long = format!("\"{}\"", "x".repeat(ID_MAX_LEN + 1));
    assert!(serde_json::from_str::<WorkflowId>(&too_long).is_err());
}

#[test]
fn short_helper_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}

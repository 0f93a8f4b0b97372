// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn events_tag_with_topic_prefix() {
    let event = Event::SessionUpdated {
        id: SessionId::from_string("stest000001"),
        status: SessionStatus::Executing,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "session:updated");
    assert_eq!(json["status"], "executing");
}

#[test]
fn unknown_type_deserializes_to_custom() {
    let event: Event = serde_json::from_str(r#"{"type": "galaxy:exploded"}"#).unwrap();
    assert_eq!(event, Event::Custom);
}

#[test]
fn workflow_complete_round_trip() {
    let event = Event::WorkflowCompleted {
        id: WorkflowId::from_string("wf--done0001"),
        session_id: SessionId::from_string("stest000001"),
        success: false,
        error: Some("retries exhausted".to_string()),
        duration_ms: 1234,
        output: None,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn log_summary_is_single_line() {
    let event = Event::ConflictDeclared {
        workflow_id: WorkflowId::from_string("wf--rev00001"),
        scope: ConflictScope::All,
        resolution: ConflictResolution::PauseOthers,
    };
    let summary = event.log_summary();
    assert!(summary.contains("conflict:declared"));
    assert!(summary.contains("*"));
    assert!(!summary.contains('\n'));
}

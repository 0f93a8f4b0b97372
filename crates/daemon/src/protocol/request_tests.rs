// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn envelope_flattens_request() {
    let envelope = RequestEnvelope {
        id: "req-1".to_string(),
        request: Request::PlanCreate { requirement: "build it".to_string() },
    };
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["id"], "req-1");
    assert_eq!(json["type"], "plan.create");
    assert_eq!(json["requirement"], "build it");
}

#[parameterized(
    status = { r#"{"id":"1","type":"status"}"# },
    session_list = { r#"{"id":"2","type":"session.list"}"# },
    pool_resize = { r#"{"id":"3","type":"pool.resize","size":5}"# },
    exec_start = { r#"{"id":"4","type":"exec.start","session":"sabc1234567"}"# },
    evaluate = { r#"{"id":"5","type":"coordinator.evaluate"}"# },
    subscribe = { r#"{"id":"6","type":"subscribe"}"# },
)]
fn known_requests_parse(json: &str) {
    let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
    assert!(!envelope.id.is_empty());
}

#[test]
fn agent_complete_carries_optional_task() {
    let json = r#"{
        "id": "7",
        "type": "agent.complete",
        "session": "sabc1234567",
        "workflow": "wf--abcdef",
        "stage": "implementation",
        "task": "sabc1234567_T2",
        "result": "success",
        "data": {"files": ["src/a.rs"]}
    }"#;
    let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
    match envelope.request {
        Request::AgentComplete { task, stage, result, .. } => {
            assert_eq!(task.map(|t| t.as_str().to_string()), Some("sabc1234567_T2".to_string()));
            assert_eq!(stage, "implementation");
            assert_eq!(result, "success");
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn agent_complete_without_task_or_data() {
    let json = r#"{
        "id": "8",
        "type": "agent.complete",
        "session": "sabc1234567",
        "workflow": "wf--abcdef",
        "stage": "planning",
        "result": "success"
    }"#;
    let envelope: RequestEnvelope = serde_json::from_str(json).unwrap();
    match envelope.request {
        Request::AgentComplete { task, data, .. } => {
            assert!(task.is_none());
            assert!(data.is_null());
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn unknown_request_type_fails() {
    let json = r#"{"id":"9","type":"time.travel"}"#;
    assert!(serde_json::from_str::<RequestEnvelope>(json).is_err());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    implementation_success = { Stage::Implementation, SignalResult::Success, true },
    implementation_failed = { Stage::Implementation, SignalResult::Failed, true },
    implementation_approved = { Stage::Implementation, SignalResult::Approved, false },
    review_approved = { Stage::Review, SignalResult::Approved, true },
    review_changes = { Stage::Review, SignalResult::ChangesRequested, true },
    review_success = { Stage::Review, SignalResult::Success, false },
    analysis_pass = { Stage::Analysis, SignalResult::Pass, true },
    analysis_critical = { Stage::Analysis, SignalResult::Critical, true },
    analysis_minor = { Stage::Analysis, SignalResult::Minor, true },
    analysis_complete = { Stage::Analysis, SignalResult::Complete, false },
    error_analysis_complete = { Stage::ErrorAnalysis, SignalResult::Complete, true },
    finalize_success = { Stage::Finalize, SignalResult::Success, true },
    planning_success = { Stage::Planning, SignalResult::Success, true },
)]
fn result_validity(stage: Stage, result: SignalResult, valid: bool) {
    assert_eq!(result.valid_for(stage), valid);
}

#[test]
fn stage_round_trips_from_str() {
    for stage in [
        Stage::Context,
        Stage::DeltaContext,
        Stage::Implementation,
        Stage::Review,
        Stage::Analysis,
        Stage::ErrorAnalysis,
        Stage::Finalize,
        Stage::Planning,
    ] {
        let parsed: Stage = stage.to_string().parse().unwrap();
        assert_eq!(parsed, stage);
    }
}

#[test]
fn result_round_trips_from_str() {
    for result in [
        SignalResult::Success,
        SignalResult::Failed,
        SignalResult::Approved,
        SignalResult::ChangesRequested,
        SignalResult::Pass,
        SignalResult::Critical,
        SignalResult::Minor,
        SignalResult::Complete,
    ] {
        let parsed: SignalResult = result.to_string().parse().unwrap();
        assert_eq!(parsed, result);
    }
}

#[test]
fn key_excludes_session() {
    let a = CompletionSignal::builder()
        .session_id(SessionId::from_string("saaaaaaaaaa"))
        .build();
    let b = CompletionSignal::builder()
        .session_id(SessionId::from_string("sbbbbbbbbbb"))
        .build();
    assert_eq!(a.key(), b.key());
}

#[test]
fn key_distinguishes_task() {
    let with_task = CompletionSignal::builder()
        .task_id(TaskId::from_string("stest000001_T1"))
        .build();
    let without = CompletionSignal::builder().build();
    assert_ne!(with_task.key(), without.key());
}

#[test]
fn payload_files_extracts_list() {
    let signal = CompletionSignal::builder()
        .payload(serde_json::json!({ "files": ["src/a.rs", "src/b.rs"], "note": "ok" }))
        .build();
    let files = signal.payload_files();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], std::path::PathBuf::from("src/a.rs"));
}

#[test]
fn payload_files_empty_when_absent() {
    let signal = CompletionSignal::builder().build();
    assert!(signal.payload_files().is_empty());
}

#[test]
fn signal_serde_round_trip() {
    let signal = CompletionSignal::builder()
        .stage(Stage::Review)
        .result(SignalResult::ChangesRequested)
        .task_id(TaskId::from_string("stest000001_T2"))
        .payload(serde_json::json!({ "feedback": "tighten error handling" }))
        .build();
    let json = serde_json::to_string(&signal).unwrap();
    let back: CompletionSignal = serde_json::from_str(&json).unwrap();
    assert_eq!(back, signal);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    completed = { WorkflowStatus::Completed, true },
    failed = { WorkflowStatus::Failed, true },
    cancelled = { WorkflowStatus::Cancelled, true },
    running = { WorkflowStatus::Running, false },
    paused = { WorkflowStatus::Paused, false },
    blocked = { WorkflowStatus::Blocked, false },
    pending = { WorkflowStatus::Pending, false },
)]
fn terminal_statuses(status: WorkflowStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn suspended_covers_paused_and_blocked() {
    assert!(WorkflowStatus::Paused.is_suspended());
    assert!(WorkflowStatus::Blocked.is_suspended());
    assert!(!WorkflowStatus::Running.is_suspended());
}

#[test]
fn lower_priority_wins_ordering() {
    assert!(Priority::REVISION < Priority::NORMAL);
    assert!(Priority(0) < Priority(255));
}

#[test]
fn record_round_trips_json() {
    let record = WorkflowRecord::builder()
        .kind("planning")
        .phase_name("analysts")
        .phase_index(1)
        .partial_output("touched src/lib.rs")
        .build();
    let json = serde_json::to_string(&record).unwrap();
    let back: WorkflowRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn record_omits_empty_optionals() {
    let record = WorkflowRecord::builder().build();
    let json = serde_json::to_string(&record).unwrap();
    assert!(!json.contains("partial_output"));
    assert!(!json.contains("files_modified"));
    assert!(!json.contains("\"error\""));
}

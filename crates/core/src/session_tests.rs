// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn session_id_has_no_separator_chars() {
    for _ in 0..50 {
        let id = SessionId::new();
        assert!(!id.suffix_contains_separator(), "bad id: {id}");
    }
}

impl SessionId {
    fn suffix_contains_separator(&self) -> bool {
        self.as_str().contains('_') || self.as_str().contains('-')
    }
}

#[parameterized(
    debating_to_reviewing = { SessionStatus::Debating, SessionStatus::Reviewing, true },
    reviewing_to_approved = { SessionStatus::Reviewing, SessionStatus::Approved, true },
    reviewing_to_revising = { SessionStatus::Reviewing, SessionStatus::Revising, true },
    revising_back_to_reviewing = { SessionStatus::Revising, SessionStatus::Reviewing, true },
    approved_to_executing = { SessionStatus::Approved, SessionStatus::Executing, true },
    executing_to_completed = { SessionStatus::Executing, SessionStatus::Completed, true },
    paused_resumes = { SessionStatus::Paused, SessionStatus::Executing, true },
    stopped_resumes = { SessionStatus::Stopped, SessionStatus::Executing, true },
    executing_to_revising = { SessionStatus::Executing, SessionStatus::Revising, true },
    revising_back_to_executing = { SessionStatus::Revising, SessionStatus::Executing, true },
    completed_is_terminal = { SessionStatus::Completed, SessionStatus::Executing, false },
    cancelled_is_terminal = { SessionStatus::Cancelled, SessionStatus::Debating, false },
    no_skip_to_executing = { SessionStatus::Debating, SessionStatus::Executing, false },
    executing_cannot_cancel = { SessionStatus::Executing, SessionStatus::Cancelled, false },
)]
fn transition_table(from: SessionStatus, to: SessionStatus, allowed: bool) {
    assert_eq!(from.can_transition(to), allowed);
}

#[parameterized(
    debating = { SessionStatus::Debating, SessionStatus::Cancelled },
    reviewing = { SessionStatus::Reviewing, SessionStatus::Cancelled },
    revising = { SessionStatus::Revising, SessionStatus::Cancelled },
    approved = { SessionStatus::Approved, SessionStatus::Cancelled },
    executing = { SessionStatus::Executing, SessionStatus::Stopped },
    paused = { SessionStatus::Paused, SessionStatus::Stopped },
    completed_unchanged = { SessionStatus::Completed, SessionStatus::Completed },
)]
fn interruption_policy(status: SessionStatus, expected: SessionStatus) {
    assert_eq!(status.interrupted(), expected);
}

#[test]
fn set_plan_bumps_version_and_keeps_history() {
    let mut session = Session::new(SessionId::new(), "requirement", 100);
    session.set_plan("/tmp/plan_v1.md".into(), 200);
    assert_eq!(session.plan_version, 1);
    assert!(session.plan_history.is_empty());

    session.set_plan("/tmp/plan_v2.md".into(), 300);
    assert_eq!(session.plan_version, 2);
    assert_eq!(session.plan_history, vec![std::path::PathBuf::from("/tmp/plan_v1.md")]);
    assert_eq!(session.plan_path.as_deref(), Some(std::path::Path::new("/tmp/plan_v2.md")));
    assert_eq!(session.updated_at_ms, 300);
}

#[test]
fn status_serializes_snake_case() {
    let json = serde_json::to_string(&SessionStatus::Revising).unwrap();
    assert_eq!(json, "\"revising\"");
}

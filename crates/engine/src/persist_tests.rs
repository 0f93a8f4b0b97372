// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use apc_core::{SessionStatus, WorkflowStatus};

fn setup() -> (tempfile::TempDir, Persistence) {
    let dir = tempfile::tempdir().unwrap();
    let persist = Persistence::new(dir.path());
    (dir, persist)
}

fn sid() -> SessionId {
    SessionId::from_string("spersist001")
}

#[test]
fn session_round_trip() {
    let (_dir, persist) = setup();
    let mut session = Session::new(sid(), "build a parser", 100);
    session.status = SessionStatus::Reviewing;
    persist.save_session(&session).unwrap();

    let loaded = persist.load_sessions().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, sid());
    assert_eq!(loaded[0].status, SessionStatus::Reviewing);
    assert_eq!(loaded[0].requirement, "build a parser");
}

#[test]
fn load_sessions_empty_state_dir() {
    let (_dir, persist) = setup();
    assert!(persist.load_sessions().unwrap().is_empty());
}

#[test]
fn workflow_record_round_trip() {
    let (_dir, persist) = setup();
    let record = WorkflowRecord::builder()
        .session_id(sid())
        .status(WorkflowStatus::Running)
        .phase_index(2)
        .phase_name("review")
        .build();
    persist.save_workflow(&record).unwrap();

    let loaded = persist.load_workflows().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], record);
}

#[test]
fn save_workflow_overwrites_atomically() {
    let (_dir, persist) = setup();
    let mut record = WorkflowRecord::builder().session_id(sid()).build();
    persist.save_workflow(&record).unwrap();
    record.phase_index = 3;
    record.status = WorkflowStatus::Paused;
    persist.save_workflow(&record).unwrap();

    let loaded = persist.load_workflows().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].phase_index, 3);
    // No stray temp file left behind
    let workflows_dir = persist.session_dir(sid()).join("workflows");
    let leftovers: Vec<_> = std::fs::read_dir(workflows_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn delete_workflow_is_idempotent() {
    let (_dir, persist) = setup();
    let record = WorkflowRecord::builder().session_id(sid()).build();
    persist.save_workflow(&record).unwrap();

    persist.delete_workflow(sid(), record.id).unwrap();
    persist.delete_workflow(sid(), record.id).unwrap();
    assert!(persist.load_workflows().unwrap().is_empty());
}

#[test]
fn corrupt_workflow_state_is_skipped() {
    let (_dir, persist) = setup();
    let good = WorkflowRecord::builder().session_id(sid()).build();
    persist.save_workflow(&good).unwrap();
    let bad = persist.session_dir(sid()).join("workflows").join("wf--corrupt.state.json");
    std::fs::write(bad, "{ not json").unwrap();

    let loaded = persist.load_workflows().unwrap();
    assert_eq!(loaded.len(), 1);
}

#[test]
fn backup_plan_copies_with_timestamp() {
    let (_dir, persist) = setup();
    persist.ensure_session_dirs(sid()).unwrap();
    std::fs::write(persist.plan_path(sid()), "- [ ] spersist001_T1: X\n").unwrap();

    let backup = persist.backup_plan(sid(), 1_700_000_000_000).unwrap().unwrap();
    assert!(backup.exists());
    assert!(backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("plan_backup_"));
    assert_eq!(
        std::fs::read_to_string(backup).unwrap(),
        "- [ ] spersist001_T1: X\n"
    );
}

#[test]
fn backup_without_plan_is_none() {
    let (_dir, persist) = setup();
    persist.ensure_session_dirs(sid()).unwrap();
    assert!(persist.backup_plan(sid(), 0).unwrap().is_none());
}

#[test]
fn pool_size_round_trip_keyed_by_root() {
    let (_dir, persist) = setup();
    let root_a = Path::new("/home/dev/project-a");
    let root_b = Path::new("/home/dev/project-b");

    persist.save_pool_size(root_a, 7).unwrap();
    assert_eq!(persist.load_pool_size(root_a), Some(7));
    assert_eq!(persist.load_pool_size(root_b), None);
}

#[test]
fn remove_session_deletes_directory() {
    let (_dir, persist) = setup();
    let session = Session::new(sid(), "req", 0);
    persist.save_session(&session).unwrap();
    persist.remove_session(sid()).unwrap();
    assert!(persist.load_sessions().unwrap().is_empty());
    assert!(!persist.session_dir(sid()).exists());
}

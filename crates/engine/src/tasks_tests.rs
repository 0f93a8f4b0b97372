// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;

const SID: &str = "s1abc2def3";

fn registry_with(content: &str) -> (TaskRegistry, Vec<TaskId>) {
    let registry = TaskRegistry::new(EventBus::new());
    let plan = apc_plan::parse_plan(Path::new("/tmp/plan.md"), content).unwrap();
    let ids = registry.load_from_plan(&plan);
    (registry, ids)
}

fn linear_plan() -> String {
    format!(
        "- [ ] {SID}_T1: Base\n\
         - [ ] {SID}_T2: Mid (deps: {SID}_T1)\n\
         - [ ] {SID}_T3: Top (deps: {SID}_T2)\n"
    )
}

fn tid(n: u32) -> TaskId {
    TaskId::from_string(format!("{SID}_T{n}"))
}

fn sid() -> SessionId {
    SessionId::from_string(SID)
}

#[test]
fn load_replaces_previous_session_tasks() {
    let (registry, ids) = registry_with(&linear_plan());
    assert_eq!(ids.len(), 3);

    let revised = format!("- [ ] {SID}_T1: Only survivor\n");
    let plan = apc_plan::parse_plan(Path::new("/tmp/plan2.md"), &revised).unwrap();
    registry.load_from_plan(&plan);

    assert_eq!(registry.list_by_session(sid()).len(), 1);
    assert!(registry.get(tid(2)).is_none());
}

#[test]
fn checked_lines_load_as_completed() {
    let content = format!(
        "- [x] {SID}_T1: Done before\n\
         - [ ] {SID}_T2: Next (deps: {SID}_T1)\n"
    );
    let (registry, _) = registry_with(&content);
    assert_eq!(registry.get(tid(1)).unwrap().status, TaskStatus::Completed);
    assert_eq!(registry.ready_tasks(sid()), vec![tid(2)]);
}

#[test]
fn ready_tasks_respects_dependencies() {
    let (registry, _) = registry_with(&linear_plan());
    assert_eq!(registry.ready_tasks(sid()), vec![tid(1)]);

    registry.mark_status(tid(1), TaskStatus::Completed, None).unwrap();
    assert_eq!(registry.ready_tasks(sid()), vec![tid(2)]);

    registry.mark_status(tid(2), TaskStatus::Completed, None).unwrap();
    assert_eq!(registry.ready_tasks(sid()), vec![tid(3)]);
}

#[test]
fn in_progress_tasks_are_not_ready() {
    let (registry, _) = registry_with(&linear_plan());
    registry.mark_status(tid(1), TaskStatus::InProgress, None).unwrap();
    assert!(registry.ready_tasks(sid()).is_empty());
}

#[test]
fn deferred_tasks_are_excluded_until_undeferred() {
    let (registry, _) = registry_with(&linear_plan());
    registry.defer(tid(1), Some("blocked on credentials")).unwrap();
    assert!(registry.ready_tasks(sid()).is_empty());
    assert_eq!(
        registry.get(tid(1)).unwrap().status_reason.as_deref(),
        Some("blocked on credentials")
    );

    registry.undefer(tid(1)).unwrap();
    assert_eq!(registry.ready_tasks(sid()), vec![tid(1)]);
}

#[test]
fn undefer_leaves_non_deferred_status_alone() {
    let (registry, _) = registry_with(&linear_plan());
    registry.mark_status(tid(1), TaskStatus::Completed, None).unwrap();
    registry.undefer(tid(1)).unwrap();
    assert_eq!(registry.get(tid(1)).unwrap().status, TaskStatus::Completed);
}

#[test]
fn ready_tasks_are_sorted_numerically() {
    let content = format!(
        "- [ ] {SID}_T10: Ten\n\
         - [ ] {SID}_T2: Two\n\
         - [ ] {SID}_T1: One\n"
    );
    let (registry, _) = registry_with(&content);
    assert_eq!(registry.ready_tasks(sid()), vec![tid(1), tid(2), tid(10)]);
}

#[test]
fn mark_status_fires_event() {
    let (registry, _) = registry_with(&linear_plan());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = registry.events.subscribe(move |e| {
        if let Event::TaskStatusChanged { id, status, .. } = e {
            sink.lock().push((*id, *status));
        }
    });

    registry.mark_status(tid(1), TaskStatus::Failed, Some("boom")).unwrap();
    assert_eq!(*seen.lock(), vec![(tid(1), TaskStatus::Failed)]);
}

#[test]
fn unknown_task_is_an_error() {
    let (registry, _) = registry_with(&linear_plan());
    assert!(matches!(
        registry.mark_status(tid(99), TaskStatus::Completed, None),
        Err(TaskError::UnknownTask(_))
    ));
}

#[test]
fn all_completed_requires_at_least_one_task() {
    let (registry, _) = registry_with(&linear_plan());
    assert!(!registry.all_completed(sid()));
    for n in 1..=3 {
        registry.mark_status(tid(n), TaskStatus::Completed, None).unwrap();
    }
    assert!(registry.all_completed(sid()));
    assert!(!registry.all_completed(SessionId::from_string("sempty00000")));
}

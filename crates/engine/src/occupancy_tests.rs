// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn t(n: u32) -> TaskId {
    TaskId::from_string(format!("stest000001_T{n}"))
}

fn wf(n: u32) -> WorkflowId {
    WorkflowId::from_string(format!("wf--occ{n:05}"))
}

fn table() -> OccupancyTable {
    OccupancyTable::new(EventBus::new())
}

#[test]
fn exclusive_occupancy_is_single_holder() {
    let table = table();
    table.declare(wf(1), &[t(1)], OccupancyMode::Exclusive, "implementing", 0).unwrap();

    let err = table
        .declare(wf(2), &[t(1)], OccupancyMode::Exclusive, "also implementing", 0)
        .unwrap_err();
    match err {
        OccupancyError::Conflict { task, holders } => {
            assert_eq!(task, t(1));
            assert_eq!(holders, vec![wf(1)]);
        }
    }
}

#[test]
fn shared_records_coexist() {
    let table = table();
    table.declare(wf(1), &[t(1)], OccupancyMode::Shared, "reading", 0).unwrap();
    table.declare(wf(2), &[t(1)], OccupancyMode::Shared, "reading", 0).unwrap();
    assert_eq!(table.occupants_of(t(1)).len(), 2);
}

#[test]
fn shared_cannot_join_exclusive() {
    let table = table();
    table.declare(wf(1), &[t(1)], OccupancyMode::Exclusive, "implementing", 0).unwrap();
    assert!(table.declare(wf(2), &[t(1)], OccupancyMode::Shared, "reading", 0).is_err());
}

#[test]
fn exclusive_cannot_join_shared() {
    let table = table();
    table.declare(wf(1), &[t(1)], OccupancyMode::Shared, "reading", 0).unwrap();
    assert!(table.declare(wf(2), &[t(1)], OccupancyMode::Exclusive, "implementing", 0).is_err());
}

#[test]
fn declare_is_all_or_nothing() {
    let table = table();
    table.declare(wf(1), &[t(2)], OccupancyMode::Exclusive, "busy", 0).unwrap();

    assert!(table
        .declare(wf(2), &[t(1), t(2)], OccupancyMode::Exclusive, "batch", 0)
        .is_err());
    // The free task must not have been claimed by the failed batch
    assert!(table.occupants_of(t(1)).is_empty());
}

#[test]
fn redeclare_is_idempotent() {
    let table = table();
    table.declare(wf(1), &[t(1)], OccupancyMode::Exclusive, "first", 0).unwrap();
    table.declare(wf(1), &[t(1)], OccupancyMode::Exclusive, "again", 5).unwrap();
    assert_eq!(table.occupants_of(t(1)).len(), 1);
    assert_eq!(table.occupants_of(t(1))[0].reason, "first");
}

#[test]
fn release_subset_and_all() {
    let table = table();
    table.declare(wf(1), &[t(1), t(2), t(3)], OccupancyMode::Exclusive, "batch", 0).unwrap();

    let released = table.release(wf(1), Some(&[t(2)]));
    assert_eq!(released, vec![t(2)]);
    assert_eq!(table.tasks_occupied_by(wf(1)), vec![t(1), t(3)]);

    let rest = table.release(wf(1), None);
    assert_eq!(rest, vec![t(1), t(3)]);
    assert!(table.tasks_occupied_by(wf(1)).is_empty());
}

#[test]
fn release_of_non_holder_is_empty() {
    let table = table();
    table.declare(wf(1), &[t(1)], OccupancyMode::Exclusive, "busy", 0).unwrap();
    assert!(table.release(wf(2), None).is_empty());
    assert_eq!(table.occupants_of(t(1)).len(), 1);
}

#[test]
fn conflicts_against_ignores_own_declarations() {
    let events = EventBus::new();
    let conflicts = ConflictTable::new(events);
    conflicts.declare(
        wf(1),
        ConflictScope::tasks([t(1)]),
        ConflictResolution::PauseOthers,
        "revision",
        0,
    );

    assert!(conflicts.conflicts_against(wf(1), &[t(1)]).is_empty());
    assert_eq!(conflicts.conflicts_against(wf(2), &[t(1)]).len(), 1);
    assert!(conflicts.conflicts_against(wf(2), &[t(2)]).is_empty());
}

#[test]
fn wildcard_conflict_pauses_everyone() {
    let conflicts = ConflictTable::new(EventBus::new());
    conflicts.declare(wf(1), ConflictScope::All, ConflictResolution::PauseOthers, "global", 0);
    assert!(conflicts.pause_required(wf(2), &[]));
    assert!(conflicts.pause_required(wf(3), &[t(7)]));
    assert!(!conflicts.pause_required(wf(1), &[t(7)]));
}

#[test]
fn wait_for_others_does_not_require_pause() {
    let conflicts = ConflictTable::new(EventBus::new());
    conflicts.declare(
        wf(1),
        ConflictScope::tasks([t(1)]),
        ConflictResolution::WaitForOthers,
        "polite",
        0,
    );
    assert!(!conflicts.pause_required(wf(2), &[t(1)]));
    assert_eq!(conflicts.conflicts_against(wf(2), &[t(1)]).len(), 1);
}

#[test]
fn clear_removes_all_declarations() {
    let conflicts = ConflictTable::new(EventBus::new());
    conflicts.declare(wf(1), ConflictScope::All, ConflictResolution::PauseOthers, "a", 0);
    conflicts.declare(wf(1), ConflictScope::tasks([t(1)]), ConflictResolution::PauseOthers, "b", 0);

    assert_eq!(conflicts.clear(wf(1)), 2);
    assert!(conflicts.all().is_empty());
    assert_eq!(conflicts.clear(wf(1)), 0);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Occupancy and conflict tables.
//!
//! Occupancy records who is working on which task (exclusive or shared).
//! Conflict declarations record intent only; the coordinator's reconciliation
//! pass reads them to decide which workflows to pause or resume.

use std::collections::HashMap;
use std::sync::Arc;

use apc_core::{
    ConflictDeclaration, ConflictResolution, ConflictScope, Event, OccupancyMode, OccupancyRecord,
    TaskId, WorkflowId,
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::event_bus::EventBus;

/// Errors from occupancy declarations.
#[derive(Debug, Error)]
pub enum OccupancyError {
    #[error("task {task} already occupied by {holders:?}")]
    Conflict {
        task: TaskId,
        holders: Vec<WorkflowId>,
    },
}

/// Maps task-id → current occupancy records.
#[derive(Clone)]
pub struct OccupancyTable {
    inner: Arc<Mutex<HashMap<TaskId, Vec<OccupancyRecord>>>>,
    events: EventBus,
}

impl OccupancyTable {
    pub fn new(events: EventBus) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), events }
    }

    /// Declare occupancy over a task set.
    ///
    /// All-or-nothing: an exclusive request fails if any listed task has any
    /// other occupant, and a shared request fails against an exclusive
    /// occupant. Re-declaring a task the workflow already holds is a no-op
    /// for that task.
    pub fn declare(
        &self,
        workflow: WorkflowId,
        tasks: &[TaskId],
        mode: OccupancyMode,
        reason: &str,
        now_ms: u64,
    ) -> Result<(), OccupancyError> {
        {
            let mut inner = self.inner.lock();
            for task in tasks {
                let records = inner.entry(*task).or_default();
                let others: Vec<WorkflowId> = records
                    .iter()
                    .filter(|r| r.workflow_id != workflow)
                    .map(|r| r.workflow_id)
                    .collect();
                let exclusive_other = records
                    .iter()
                    .any(|r| r.workflow_id != workflow && r.mode == OccupancyMode::Exclusive);
                if (mode == OccupancyMode::Exclusive && !others.is_empty()) || exclusive_other {
                    return Err(OccupancyError::Conflict { task: *task, holders: others });
                }
            }
            for task in tasks {
                let records = inner.entry(*task).or_default();
                if records.iter().any(|r| r.workflow_id == workflow) {
                    continue;
                }
                records.push(OccupancyRecord {
                    task_id: *task,
                    workflow_id: workflow,
                    mode,
                    reason: reason.to_string(),
                    declared_at_ms: now_ms,
                });
            }
        }
        self.events.fire(&Event::OccupancyDeclared {
            workflow_id: workflow,
            task_ids: tasks.to_vec(),
            mode,
        });
        Ok(())
    }

    /// Release a workflow's occupancy; `tasks = None` releases everything it
    /// holds. Returns the released task ids.
    pub fn release(&self, workflow: WorkflowId, tasks: Option<&[TaskId]>) -> Vec<TaskId> {
        let released: Vec<TaskId> = {
            let mut inner = self.inner.lock();
            let mut released = Vec::new();
            inner.retain(|task, records| {
                let applies = match tasks {
                    Some(subset) => subset.contains(task),
                    None => true,
                };
                if applies {
                    let before = records.len();
                    records.retain(|r| r.workflow_id != workflow);
                    if records.len() < before {
                        released.push(*task);
                    }
                }
                !records.is_empty()
            });
            released.sort();
            released
        };
        if !released.is_empty() {
            self.events.fire(&Event::OccupancyReleased {
                workflow_id: workflow,
                task_ids: released.clone(),
            });
        }
        released
    }

    pub fn occupants_of(&self, task: TaskId) -> Vec<OccupancyRecord> {
        self.inner.lock().get(&task).cloned().unwrap_or_default()
    }

    pub fn tasks_occupied_by(&self, workflow: WorkflowId) -> Vec<TaskId> {
        let inner = self.inner.lock();
        let mut tasks: Vec<TaskId> = inner
            .iter()
            .filter(|(_, records)| records.iter().any(|r| r.workflow_id == workflow))
            .map(|(task, _)| *task)
            .collect();
        tasks.sort();
        tasks
    }
}

/// Declared conflicts, keyed by the declaring workflow.
#[derive(Clone)]
pub struct ConflictTable {
    inner: Arc<Mutex<HashMap<WorkflowId, Vec<ConflictDeclaration>>>>,
    events: EventBus,
}

impl ConflictTable {
    pub fn new(events: EventBus) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), events }
    }

    /// Record a conflict declaration. Does not pause anything by itself.
    pub fn declare(
        &self,
        workflow: WorkflowId,
        scope: ConflictScope,
        resolution: ConflictResolution,
        reason: &str,
        now_ms: u64,
    ) {
        {
            let mut inner = self.inner.lock();
            inner.entry(workflow).or_default().push(ConflictDeclaration {
                workflow_id: workflow,
                scope: scope.clone(),
                resolution,
                reason: reason.to_string(),
                declared_at_ms: now_ms,
            });
        }
        self.events.fire(&Event::ConflictDeclared { workflow_id: workflow, scope, resolution });
    }

    /// Drop every declaration made by a workflow. Returns how many were
    /// cleared.
    pub fn clear(&self, workflow: WorkflowId) -> usize {
        let cleared = self.inner.lock().remove(&workflow).map(|v| v.len()).unwrap_or(0);
        if cleared > 0 {
            self.events.fire(&Event::ConflictCleared { workflow_id: workflow });
        }
        cleared
    }

    /// Declarations by *other* workflows whose scope intersects the given
    /// occupied-task set.
    pub fn conflicts_against(
        &self,
        workflow: WorkflowId,
        occupied: &[TaskId],
    ) -> Vec<ConflictDeclaration> {
        let inner = self.inner.lock();
        inner
            .iter()
            .filter(|(declarer, _)| **declarer != workflow)
            .flat_map(|(_, declarations)| declarations.iter())
            .filter(|d| d.scope.intersects(occupied.iter()))
            .cloned()
            .collect()
    }

    /// All current declarations.
    pub fn all(&self) -> Vec<ConflictDeclaration> {
        self.inner.lock().values().flatten().cloned().collect()
    }

    /// Whether any workflow other than `workflow` currently declares a
    /// `pause_others` conflict intersecting `occupied`.
    pub fn pause_required(&self, workflow: WorkflowId, occupied: &[TaskId]) -> bool {
        self.conflicts_against(workflow, occupied)
            .iter()
            .any(|d| d.resolution == ConflictResolution::PauseOthers)
    }
}

#[cfg(test)]
#[path = "occupancy_tests.rs"]
mod tests;

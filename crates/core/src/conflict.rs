// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict declarations: a workflow's intent that certain tasks must not be
//! worked on concurrently by others.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::id::WorkflowId;
use crate::task::TaskId;

/// Which tasks a conflict declaration covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictScope {
    /// A specific task-id set
    Tasks(BTreeSet<TaskId>),
    /// Wildcard: every task of the session (`*`)
    All,
}

impl ConflictScope {
    pub fn tasks(ids: impl IntoIterator<Item = TaskId>) -> Self {
        ConflictScope::Tasks(ids.into_iter().collect())
    }

    /// Whether the scope covers the given task.
    pub fn covers(&self, task: TaskId) -> bool {
        match self {
            ConflictScope::All => true,
            ConflictScope::Tasks(ids) => ids.contains(&task),
        }
    }

    /// Whether the scope intersects any of the given tasks.
    ///
    /// A wildcard intersects even an empty occupied set: it claims the whole
    /// session, occupied or not.
    pub fn intersects<'a>(&self, tasks: impl IntoIterator<Item = &'a TaskId>) -> bool {
        match self {
            ConflictScope::All => true,
            ConflictScope::Tasks(ids) => tasks.into_iter().any(|t| ids.contains(t)),
        }
    }
}

impl std::fmt::Display for ConflictScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictScope::All => f.write_str("*"),
            ConflictScope::Tasks(ids) => {
                let mut first = true;
                for id in ids {
                    if !first {
                        f.write_str(",")?;
                    }
                    write!(f, "{id}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// How the coordinator should resolve a declared conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Force-pause every workflow occupying an intersecting task
    PauseOthers,
    /// Declarer waits until intersecting occupancy clears
    WaitForOthers,
    /// Declarer aborts if any intersecting task is occupied
    AbortIfOccupied,
}

crate::simple_display! {
    ConflictResolution {
        PauseOthers => "pause_others",
        WaitForOthers => "wait_for_others",
        AbortIfOccupied => "abort_if_occupied",
    }
}

/// A recorded conflict declaration.
///
/// Declaring records intent only; the coordinator's reconciliation pass reads
/// the table and drives pause decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDeclaration {
    pub workflow_id: WorkflowId,
    pub scope: ConflictScope,
    pub resolution: ConflictResolution,
    pub reason: String,
    pub declared_at_ms: u64,
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;

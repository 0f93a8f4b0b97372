// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-occupancy records.

use serde::{Deserialize, Serialize};

use crate::id::WorkflowId;
use crate::task::TaskId;

/// How a workflow occupies a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyMode {
    /// Sole occupant; excludes every other record
    Exclusive,
    /// Coexists with other shared records only
    Shared,
}

crate::simple_display! {
    OccupancyMode {
        Exclusive => "exclusive",
        Shared => "shared",
    }
}

/// A workflow's declaration that it is working on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub task_id: TaskId,
    pub workflow_id: WorkflowId,
    pub mode: OccupancyMode,
    pub reason: String,
    pub declared_at_ms: u64,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured progress records emitted on every workflow transition.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::id::WorkflowId;
use crate::task::TaskId;
use crate::workflow::WorkflowStatus;

/// One progress record: status change, phase boundary, or log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub workflow_id: WorkflowId,
    /// Workflow type name
    pub kind: String,
    pub status: WorkflowStatus,
    pub phase: String,
    pub phase_index: usize,
    pub total_phases: usize,
    /// `phase_index / total_phases`; 1.0 on terminal finalize
    pub percentage: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub log_path: PathBuf,
}

impl WorkflowProgress {
    /// Percentage for a phase position, clamped to [0, 1].
    pub fn percent(phase_index: usize, total_phases: usize) -> f64 {
        if total_phases == 0 {
            return 0.0;
        }
        (phase_index as f64 / total_phases as f64).clamp(0.0, 1.0)
    }
}

crate::builder! {
    pub struct WorkflowProgressBuilder => WorkflowProgress {
        into {
            kind: String = "task_implementation",
            phase: String = "implement",
            message: String = "",
            log_path: PathBuf = "/tmp/wf.log",
        }
        set {
            workflow_id: WorkflowId = WorkflowId::from_string("wf--test0001"),
            status: WorkflowStatus = WorkflowStatus::Running,
            phase_index: usize = 0,
            total_phases: usize = 1,
            percentage: f64 = 0.0,
        }
        option {
            task_id: TaskId = None,
        }
    }
}

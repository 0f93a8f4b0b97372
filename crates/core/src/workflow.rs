// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow status machine and the compact persisted record.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::id::WorkflowId;
use crate::session::SessionId;

/// Status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Waiting for admission (dependencies, pool, or a blocking revision)
    Pending,
    Running,
    /// Explicitly paused; resumes only on request
    Paused,
    /// Paused by conflict reconciliation; resumes when conflicts clear
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    WorkflowStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Blocked => "blocked",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Suspended either by the user or by reconciliation.
    pub fn is_suspended(&self) -> bool {
        matches!(self, WorkflowStatus::Paused | WorkflowStatus::Blocked)
    }
}

/// Dispatch priority. Lower numbers win; ties break FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Default priority for user-dispatched workflows.
    pub const NORMAL: Priority = Priority(5);
    /// Revisions preempt ordinary work in the dispatch queue.
    pub const REVISION: Priority = Priority(1);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compact per-workflow record persisted at every status transition and
/// phase boundary, and the unit of crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    /// Workflow type name as registered (e.g. "task_implementation")
    pub kind: String,
    pub session_id: SessionId,
    pub status: WorkflowStatus,
    pub priority: crate::workflow::Priority,
    pub phase_index: usize,
    pub phase_name: String,
    /// Input payload the workflow was dispatched with
    pub input: serde_json::Value,
    /// Best-effort continuation context captured on a forced pause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<String>,
    /// Files reported modified so far (implementation workflows)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at_ms: u64,
}

crate::builder! {
    pub struct WorkflowRecordBuilder => WorkflowRecord {
        into {
            kind: String = "task_implementation",
            phase_name: String = "implement",
        }
        set {
            id: WorkflowId = WorkflowId::from_string("wf--test0001"),
            session_id: SessionId = SessionId::from_string("stest000001"),
            status: WorkflowStatus = WorkflowStatus::Pending,
            priority: Priority = Priority::NORMAL,
            phase_index: usize = 0,
            input: serde_json::Value = serde_json::Value::Null,
            files_modified: Vec<PathBuf> = Vec::new(),
            updated_at_ms: u64 = 0,
        }
        option {
            partial_output: String = None,
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;

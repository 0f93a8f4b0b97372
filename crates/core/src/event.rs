// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types published on the coordinator's event bus.

use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictResolution, ConflictScope};
use crate::id::WorkflowId;
use crate::occupancy::OccupancyMode;
use crate::progress::WorkflowProgress;
use crate::session::{SessionId, SessionStatus};
use crate::signal::Stage;
use crate::task::{TaskId, TaskStatus};

/// Events observable by IPC subscribers and in-process listeners.
///
/// Serializes with `{"type": "topic:name", ...fields}` format.
/// Unknown type tags deserialize to `Custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- session --
    #[serde(rename = "session:updated")]
    SessionUpdated { id: SessionId, status: SessionStatus },

    // -- workflow --
    #[serde(rename = "workflow:started")]
    WorkflowStarted {
        id: WorkflowId,
        kind: String,
        session_id: SessionId,
    },

    #[serde(rename = "workflow:progress")]
    WorkflowProgressed { progress: WorkflowProgress },

    #[serde(rename = "workflow:complete")]
    WorkflowCompleted {
        id: WorkflowId,
        session_id: SessionId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },

    // -- agent --
    #[serde(rename = "agent:allocated")]
    AgentAllocated {
        agent: String,
        workflow_id: WorkflowId,
        role: String,
    },

    #[serde(rename = "agent:released")]
    AgentReleased { agent: String, workflow_id: WorkflowId },

    #[serde(rename = "agent:benched")]
    AgentBenched { agent: String, workflow_id: WorkflowId },

    // -- pool --
    #[serde(rename = "pool:resized")]
    PoolResized { size: usize },

    // -- task --
    #[serde(rename = "task:status")]
    TaskStatusChanged {
        id: TaskId,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // -- occupancy --
    #[serde(rename = "occupancy:declared")]
    OccupancyDeclared {
        workflow_id: WorkflowId,
        task_ids: Vec<TaskId>,
        mode: OccupancyMode,
    },

    #[serde(rename = "occupancy:released")]
    OccupancyReleased {
        workflow_id: WorkflowId,
        task_ids: Vec<TaskId>,
    },

    // -- conflict --
    #[serde(rename = "conflict:declared")]
    ConflictDeclared {
        workflow_id: WorkflowId,
        scope: ConflictScope,
        resolution: ConflictResolution,
    },

    #[serde(rename = "conflict:cleared")]
    ConflictCleared { workflow_id: WorkflowId },

    // -- signal --
    #[serde(rename = "signal:discarded")]
    SignalDiscarded {
        workflow_id: WorkflowId,
        stage: Stage,
        reason: String,
    },

    // -- error --
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workflow_id: Option<WorkflowId>,
    },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    /// Short one-line summary for log spans.
    pub fn log_summary(&self) -> String {
        match self {
            Event::SessionUpdated { id, status } => format!("session:updated {id} {status}"),
            Event::WorkflowStarted { id, kind, .. } => format!("workflow:started {id} {kind}"),
            Event::WorkflowProgressed { progress } => format!(
                "workflow:progress {} {}/{} {}",
                progress.workflow_id, progress.phase_index, progress.total_phases, progress.phase
            ),
            Event::WorkflowCompleted { id, success, .. } => {
                format!("workflow:complete {id} success={success}")
            }
            Event::AgentAllocated { agent, workflow_id, .. } => {
                format!("agent:allocated {agent} -> {workflow_id}")
            }
            Event::AgentReleased { agent, .. } => format!("agent:released {agent}"),
            Event::AgentBenched { agent, .. } => format!("agent:benched {agent}"),
            Event::PoolResized { size } => format!("pool:resized {size}"),
            Event::TaskStatusChanged { id, status, .. } => format!("task:status {id} {status}"),
            Event::OccupancyDeclared { workflow_id, task_ids, mode } => {
                format!("occupancy:declared {workflow_id} {mode} x{}", task_ids.len())
            }
            Event::OccupancyReleased { workflow_id, task_ids } => {
                format!("occupancy:released {workflow_id} x{}", task_ids.len())
            }
            Event::ConflictDeclared { workflow_id, scope, resolution } => {
                format!("conflict:declared {workflow_id} [{scope}] {resolution}")
            }
            Event::ConflictCleared { workflow_id } => format!("conflict:cleared {workflow_id}"),
            Event::SignalDiscarded { workflow_id, stage, reason } => {
                format!("signal:discarded {workflow_id}/{stage}: {reason}")
            }
            Event::Error { message, .. } => format!("error: {message}"),
            Event::Custom => "custom".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use apc_core::{SessionId, TaskId, WorkflowId};
use serde::{Deserialize, Serialize};

/// Client frame: a request with a client-chosen correlation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    pub id: String,
    #[serde(flatten)]
    pub request: Request,
}

/// Request from CLI to daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Daemon status overview
    #[serde(rename = "status")]
    Status,

    /// Stream unsolicited events until disconnect
    #[serde(rename = "subscribe")]
    Subscribe,

    // -- session --
    #[serde(rename = "session.list")]
    SessionList,

    #[serde(rename = "session.get")]
    SessionGet { session: SessionId },

    #[serde(rename = "session.pause")]
    SessionPause { session: SessionId },

    #[serde(rename = "session.resume")]
    SessionResume { session: SessionId },

    #[serde(rename = "session.stop")]
    SessionStop { session: SessionId },

    #[serde(rename = "session.remove")]
    SessionRemove { session: SessionId },

    // -- plan --
    /// Create a session and start planning
    #[serde(rename = "plan.create")]
    PlanCreate { requirement: String },

    #[serde(rename = "plan.approve")]
    PlanApprove { session: SessionId },

    #[serde(rename = "plan.revise")]
    PlanRevise {
        session: SessionId,
        instruction: String,
    },

    #[serde(rename = "plan.cancel")]
    PlanCancel { session: SessionId },

    #[serde(rename = "plan.restart")]
    PlanRestart { session: SessionId },

    // -- pool --
    #[serde(rename = "pool.status")]
    PoolStatus,

    #[serde(rename = "pool.resize")]
    PoolResize { size: usize },

    // -- exec --
    #[serde(rename = "exec.start")]
    ExecStart { session: SessionId },

    #[serde(rename = "exec.pause")]
    ExecPause { session: SessionId },

    #[serde(rename = "exec.resume")]
    ExecResume { session: SessionId },

    #[serde(rename = "exec.stop")]
    ExecStop { session: SessionId },

    #[serde(rename = "exec.status")]
    ExecStatus { session: SessionId },

    // -- workflow --
    /// Fresh implementation workflow for a failed task
    #[serde(rename = "workflow.retry")]
    WorkflowRetry { session: SessionId, task: TaskId },

    // -- coordinator --
    /// Force a reconciliation pass
    #[serde(rename = "coordinator.evaluate")]
    CoordinatorEvaluate,

    /// Agent CLI callback delivering a completion signal
    #[serde(rename = "agent.complete")]
    AgentComplete {
        session: SessionId,
        workflow: WorkflowId,
        stage: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<TaskId>,
        result: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;

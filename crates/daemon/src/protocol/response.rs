// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use apc_core::{Event, SessionId, WorkflowId};
use serde::{Deserialize, Serialize};

use super::{SessionDetail, SessionSummary, StatusDto};

/// Server reply correlated on the client-chosen request id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    pub id: String,
    #[serde(flatten)]
    pub response: Response,
}

/// A frame the server may send: a correlated response or an unsolicited
/// event (after `subscribe`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerFrame {
    Response(ResponseEnvelope),
    Event { event: Event },
}

/// Response from daemon to CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    #[serde(rename = "ok")]
    Ok,

    /// Daemon status overview
    #[serde(rename = "status")]
    Status { status: StatusDto },

    /// List of sessions
    #[serde(rename = "sessions")]
    Sessions { sessions: Vec<SessionSummary> },

    /// Single session details
    #[serde(rename = "session")]
    Session { session: Box<SessionDetail> },

    /// Session created with its planning workflow
    #[serde(rename = "plan.created")]
    PlanCreated {
        session: SessionId,
        workflow: WorkflowId,
    },

    /// Plan approved; number of tasks loaded
    #[serde(rename = "plan.approved")]
    PlanApproved { session: SessionId, tasks: usize },

    /// One workflow dispatched
    #[serde(rename = "workflow.dispatched")]
    WorkflowDispatched { workflow: WorkflowId },

    /// Several workflows dispatched (exec.start)
    #[serde(rename = "workflows.dispatched")]
    WorkflowsDispatched { workflows: Vec<WorkflowId> },

    /// Pool counters
    #[serde(rename = "pool")]
    Pool { pool: super::PoolStatusDto },

    /// Completion signal accepted ("consumed", "retained", or "discarded")
    #[serde(rename = "signal.accepted")]
    SignalAccepted { delivery: String },

    /// Subscription established; events follow
    #[serde(rename = "subscribed")]
    Subscribed,

    /// Domain failure
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;

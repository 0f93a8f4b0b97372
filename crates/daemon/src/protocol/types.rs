// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTO structs for the IPC protocol.

use apc_core::{
    Session, SessionId, SessionStatus, TaskId, WorkflowId, WorkflowRecord, WorkflowStatus,
};
use apc_engine::{PoolStatus, SessionState};
use serde::{Deserialize, Serialize};

/// Summary of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub status: SessionStatus,
    pub requirement: String,
    pub plan_version: u32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        SessionSummary {
            id: session.id,
            status: session.status,
            requirement: session.requirement.clone(),
            plan_version: session.plan_version,
            created_at_ms: session.created_at_ms,
            updated_at_ms: session.updated_at_ms,
        }
    }
}

/// Summary of a workflow for session detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub kind: String,
    pub status: WorkflowStatus,
    pub phase: String,
    pub phase_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at_ms: u64,
}

impl From<&WorkflowRecord> for WorkflowSummary {
    fn from(record: &WorkflowRecord) -> Self {
        WorkflowSummary {
            id: record.id,
            kind: record.kind.clone(),
            status: record.status,
            phase: record.phase_name.clone(),
            phase_index: record.phase_index,
            task_id: record
                .input
                .get("task_id")
                .and_then(|v| v.as_str())
                .map(TaskId::from_string),
            error: record.error.clone(),
            updated_at_ms: record.updated_at_ms,
        }
    }
}

/// Detailed session information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub workflows: Vec<WorkflowSummary>,
    pub pending: Vec<WorkflowId>,
}

impl From<&SessionState> for SessionDetail {
    fn from(state: &SessionState) -> Self {
        SessionDetail {
            summary: SessionSummary::from(&state.session),
            workflows: state.active.iter().map(WorkflowSummary::from).collect(),
            pending: state.pending.clone(),
        }
    }
}

/// Pool counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolStatusDto {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
}

impl From<PoolStatus> for PoolStatusDto {
    fn from(status: PoolStatus) -> Self {
        PoolStatusDto {
            total: status.total,
            available: status.available,
            busy: status.busy,
        }
    }
}

/// Daemon status overview.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusDto {
    pub version: String,
    pub uptime_secs: u64,
    pub degraded: bool,
    pub pool: PoolStatusDto,
    pub sessions: usize,
    pub workflows_active: usize,
    pub workflows_pending: usize,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion signals: the out-of-band records agents deliver through the
//! `apc agent complete` CLI callback.

use serde::{Deserialize, Serialize};

use crate::id::WorkflowId;
use crate::session::SessionId;
use crate::task::TaskId;

/// The phase dimension the signal bus matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Context,
    DeltaContext,
    Implementation,
    Review,
    Analysis,
    ErrorAnalysis,
    Finalize,
    Planning,
}

crate::simple_display! {
    Stage {
        Context => "context",
        DeltaContext => "delta_context",
        Implementation => "implementation",
        Review => "review",
        Analysis => "analysis",
        ErrorAnalysis => "error_analysis",
        Finalize => "finalize",
        Planning => "planning",
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "context" => Ok(Stage::Context),
            "delta_context" => Ok(Stage::DeltaContext),
            "implementation" => Ok(Stage::Implementation),
            "review" => Ok(Stage::Review),
            "analysis" => Ok(Stage::Analysis),
            "error_analysis" => Ok(Stage::ErrorAnalysis),
            "finalize" => Ok(Stage::Finalize),
            "planning" => Ok(Stage::Planning),
            other => Err(format!("unknown stage: {other:?}")),
        }
    }
}

/// Stage-specific result code carried by a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalResult {
    Success,
    Failed,
    Approved,
    ChangesRequested,
    Pass,
    Critical,
    Minor,
    Complete,
}

crate::simple_display! {
    SignalResult {
        Success => "success",
        Failed => "failed",
        Approved => "approved",
        ChangesRequested => "changes_requested",
        Pass => "pass",
        Critical => "critical",
        Minor => "minor",
        Complete => "complete",
    }
}

impl std::str::FromStr for SignalResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(SignalResult::Success),
            "failed" => Ok(SignalResult::Failed),
            "approved" => Ok(SignalResult::Approved),
            "changes_requested" => Ok(SignalResult::ChangesRequested),
            "pass" => Ok(SignalResult::Pass),
            "critical" => Ok(SignalResult::Critical),
            "minor" => Ok(SignalResult::Minor),
            "complete" => Ok(SignalResult::Complete),
            other => Err(format!("unknown result code: {other:?}")),
        }
    }
}

impl SignalResult {
    /// Whether this result code is valid for the given stage.
    pub fn valid_for(&self, stage: Stage) -> bool {
        use SignalResult::*;
        match stage {
            Stage::Implementation | Stage::Finalize | Stage::Context | Stage::DeltaContext
            | Stage::Planning => matches!(self, Success | Failed),
            Stage::Review => matches!(self, Approved | ChangesRequested),
            Stage::Analysis => matches!(self, Pass | Critical | Minor),
            Stage::ErrorAnalysis => matches!(self, Complete),
        }
    }
}

/// Key the signal bus matches awaiters and deliveries on.
///
/// Workflow ids are globally unique, so the session id is not part of the
/// key; it is verified separately at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalKey {
    pub workflow_id: WorkflowId,
    pub stage: Stage,
    pub task_id: Option<TaskId>,
}

impl std::fmt::Display for SignalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.task_id {
            Some(task) => write!(f, "{}/{}/{}", self.workflow_id, self.stage, task),
            None => write!(f, "{}/{}", self.workflow_id, self.stage),
        }
    }
}

/// A structured completion record delivered by an agent subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub session_id: SessionId,
    pub workflow_id: WorkflowId,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub result: SignalResult,
    /// Stage-specific payload (files list, feedback, issue lists, …)
    #[serde(default)]
    pub payload: serde_json::Value,
    pub received_at_ms: u64,
}

impl CompletionSignal {
    pub fn key(&self) -> SignalKey {
        SignalKey {
            workflow_id: self.workflow_id,
            stage: self.stage,
            task_id: self.task_id,
        }
    }

    /// Files listed in the payload's `files` array, if any.
    pub fn payload_files(&self) -> Vec<std::path::PathBuf> {
        self.payload
            .get("files")
            .and_then(|v| v.as_array())
            .map(|files| {
                files
                    .iter()
                    .filter_map(|f| f.as_str())
                    .map(std::path::PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

crate::builder! {
    pub struct CompletionSignalBuilder => CompletionSignal {
        set {
            session_id: SessionId = SessionId::from_string("stest000001"),
            workflow_id: WorkflowId = WorkflowId::from_string("wf--test0001"),
            stage: Stage = Stage::Implementation,
            result: SignalResult = SignalResult::Success,
            payload: serde_json::Value = serde_json::Value::Null,
            received_at_ms: u64 = 0,
        }
        option {
            task_id: TaskId = None,
        }
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;

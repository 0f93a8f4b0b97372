// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier, status, and record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::id::IdBuf;
use crate::session::SessionId;

/// Errors from parsing a task id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskIdError {
    #[error("task id missing '_T' separator: {0:?}")]
    MissingSeparator(String),
    #[error("task id has non-numeric suffix: {0:?}")]
    BadNumber(String),
    #[error("task id too long ({0} bytes)")]
    TooLong(usize),
}

/// Identifier of a plan task: `{sessionId}_T{N}`.
///
/// Ordered by (session, N) so that listings and ready-task computations are
/// stable and numeric (`_T2` sorts before `_T10`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub IdBuf);

impl TaskId {
    /// Build the id of task `n` within a session.
    pub fn new(session: SessionId, n: u32) -> Self {
        Self(IdBuf::new(&format!("{}_T{}", session, n)))
    }

    /// Parse and validate a task id string.
    pub fn parse(s: &str) -> Result<Self, TaskIdError> {
        if s.len() > crate::id::ID_MAX_LEN {
            return Err(TaskIdError::TooLong(s.len()));
        }
        let (session, number) =
            s.rsplit_once("_T").ok_or_else(|| TaskIdError::MissingSeparator(s.to_string()))?;
        if session.is_empty() || number.is_empty() {
            return Err(TaskIdError::MissingSeparator(s.to_string()));
        }
        if !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TaskIdError::BadNumber(s.to_string()));
        }
        Ok(Self(IdBuf::new(s)))
    }

    /// Create from a trusted string (persistence, tests).
    pub fn from_string(s: impl AsRef<str>) -> Self {
        Self(IdBuf::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Session this task belongs to.
    pub fn session_id(&self) -> SessionId {
        match self.as_str().rsplit_once("_T") {
            Some((session, _)) => SessionId::from_string(session),
            None => SessionId::from_string(self.as_str()),
        }
    }

    /// Numeric position of the task within its plan.
    pub fn number(&self) -> u32 {
        self.as_str()
            .rsplit_once("_T")
            .and_then(|(_, n)| n.parse().ok())
            .unwrap_or(0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl std::borrow::Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for TaskId {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

impl Ord for TaskId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Tie-break on the raw string so ordering stays consistent with Eq
        // even for unusual spellings like `_T01` vs `_T1`.
        let (left, right) = (self.session_id(), other.session_id());
        (left.as_str(), self.number(), self.as_str())
            .cmp(&(right.as_str(), other.number(), other.as_str()))
    }
}

impl PartialOrd for TaskId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Status of a plan task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Dependencies not yet satisfied
    Pending,
    /// All dependencies completed, eligible for dispatch
    Ready,
    /// A workflow holds occupancy and is working on it
    InProgress,
    /// Finished successfully
    Completed,
    /// Implementation workflow exhausted its retries
    Failed,
    /// Explicitly parked; excluded from readiness until undeferred
    Deferred,
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Ready => "ready",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Deferred => "deferred",
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// External-pipeline configuration attached to a task.
///
/// The coordinator never interprets this beyond routing it to the pipeline
/// phase of the owning implementation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name as written in the plan
    pub name: String,
}

/// A task parsed from the active plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// Ids of tasks that must complete before this one becomes ready
    pub depends_on: BTreeSet<TaskId>,
    /// Files the task is expected to touch (conflict granularity)
    pub target_files: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,
    pub status: TaskStatus,
    /// Why the task was last deferred or failed, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            depends_on: BTreeSet::new(),
            target_files: BTreeSet::new(),
            pipeline: None,
            status: TaskStatus::Pending,
            status_reason: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.id.session_id()
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            description: String = "do the work",
        }
        set {
            id: TaskId = TaskId::from_string("stest000001_T1"),
            depends_on: BTreeSet<TaskId> = BTreeSet::new(),
            target_files: BTreeSet<PathBuf> = BTreeSet::new(),
            status: TaskStatus = TaskStatus::Pending,
        }
        option {
            pipeline: PipelineConfig = None,
            status_reason: String = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

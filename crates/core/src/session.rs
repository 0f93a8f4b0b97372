// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier and status machine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::id::IdBuf;

/// Alphabet for session-id suffixes.
///
/// Deliberately excludes `_` and `-` so that derived task ids
/// (`{session}_T{n}`) can be split unambiguously at the last `_T`.
const SESSION_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const SESSION_SUFFIX_LEN: usize = 10;

/// Unique identifier for a planning session.
///
/// Short (`s` + 10 alphanumeric chars) so that derived task ids still fit in
/// an inline [`IdBuf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub IdBuf);

impl SessionId {
    pub const PREFIX: &'static str = "s";

    /// Generate a new random session id.
    pub fn new() -> Self {
        Self(IdBuf::new(&format!(
            "{}{}",
            Self::PREFIX,
            nanoid::nanoid!(SESSION_SUFFIX_LEN, &SESSION_ALPHABET)
        )))
    }

    /// Create a session id from an existing string.
    pub fn from_string(id: impl AsRef<str>) -> Self {
        Self(IdBuf::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for SessionId {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

impl std::borrow::Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

/// Status of a planning session.
///
/// Transitions form a DAG with `completed` and `cancelled` as the only
/// terminal states; `stopped` is resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Planning workflow is producing the initial plan
    Debating,
    /// Plan is awaiting user review
    Reviewing,
    /// A revision workflow is rewriting the plan
    Revising,
    /// Plan approved, execution not yet started
    Approved,
    /// Task workflows are running
    Executing,
    /// Execution paused by the user
    Paused,
    /// Execution interrupted (resumable)
    Stopped,
    /// All tasks finished
    Completed,
    /// Planning abandoned
    Cancelled,
}

crate::simple_display! {
    SessionStatus {
        Debating => "debating",
        Reviewing => "reviewing",
        Revising => "revising",
        Approved => "approved",
        Executing => "executing",
        Paused => "paused",
        Stopped => "stopped",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl SessionStatus {
    /// Check if this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Check if the session is in a planning-side status.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            SessionStatus::Debating
                | SessionStatus::Reviewing
                | SessionStatus::Revising
                | SessionStatus::Approved
        )
    }

    /// Whether a transition to `next` is allowed.
    pub fn can_transition(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Debating, Reviewing | Cancelled) => true,
            (Reviewing, Revising | Approved | Debating | Cancelled) => true,
            // A revision may have interrupted planning review or execution
            (Revising, Reviewing | Executing | Cancelled) => true,
            (Approved, Executing | Revising | Cancelled) => true,
            (Executing, Revising | Paused | Stopped | Completed) => true,
            (Paused, Executing | Revising | Stopped) => true,
            (Stopped, Executing) => true,
            _ => false,
        }
    }

    /// The status an interruption resolves to.
    ///
    /// During planning the session is cancelled; during execution it is
    /// stopped. Terminal statuses are unchanged.
    pub fn interrupted(&self) -> SessionStatus {
        if self.is_terminal() {
            *self
        } else if self.is_planning() {
            SessionStatus::Cancelled
        } else {
            SessionStatus::Stopped
        }
    }
}

/// A planning session: one user requirement and its plan lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// The natural-language requirement that started the session
    pub requirement: String,
    pub status: SessionStatus,
    /// Path of the currently active plan file, if one exists yet
    pub plan_path: Option<PathBuf>,
    /// Monotonic plan version; bumped by every revision
    pub plan_version: u32,
    /// Superseded plan paths, oldest first
    pub plan_history: Vec<PathBuf>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Session {
    pub fn new(id: SessionId, requirement: impl Into<String>, epoch_ms: u64) -> Self {
        Self {
            id,
            requirement: requirement.into(),
            status: SessionStatus::Debating,
            plan_path: None,
            plan_version: 0,
            plan_history: Vec::new(),
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
        }
    }

    /// Record a new active plan, pushing the previous one into history.
    pub fn set_plan(&mut self, path: PathBuf, epoch_ms: u64) {
        if let Some(old) = self.plan_path.take() {
            self.plan_history.push(old);
        }
        self.plan_path = Some(path);
        self.plan_version += 1;
        self.updated_at_ms = epoch_ms;
    }
}

crate::builder! {
    pub struct SessionBuilder => Session {
        into {
            requirement: String = "build the thing",
        }
        set {
            id: SessionId = SessionId::from_string("stest000001"),
            status: SessionStatus = SessionStatus::Debating,
            plan_version: u32 = 0,
            plan_history: Vec<PathBuf> = Vec::new(),
            created_at_ms: u64 = 0,
            updated_at_ms: u64 = 0,
        }
        option {
            plan_path: PathBuf = None,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent names, states, and roles.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Fixed roster the pool draws names from, truncated to the configured size.
///
/// Names are opaque identity tokens; they carry no capability.
pub const AGENT_ROSTER: [&str; 20] = [
    "Alex", "Betty", "Carlos", "Dana", "Elliot", "Fiona", "Gus", "Hana", "Ivan", "Jade", "Kofi",
    "Lena", "Marco", "Nadia", "Omar", "Priya", "Quinn", "Rosa", "Sven", "Tess",
];

/// Upper bound for pool resize.
pub const MAX_POOL_SIZE: usize = AGENT_ROSTER.len();

/// State of an agent slot in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// In the pool, allocatable
    Available,
    /// Allocated and executing (or about to execute) a prompt
    Busy,
    /// Allocated but idle; still owned by its workflow
    Benched,
}

crate::simple_display! {
    AgentState {
        Available => "available",
        Busy => "busy",
        Benched => "benched",
    }
}

/// Role hint passed with an agent request.
///
/// Consumed by the agent runner (prompt, model, tool set); the pool itself
/// ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for RoleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

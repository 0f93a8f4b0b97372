// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow runtime: the per-workflow state machine.
//!
//! A workflow type implements [`WorkflowSpec`] — an ordered phase list plus
//! the phase callbacks — and the runtime supplies retry, pause/resume,
//! cancellation, logging, progress emission, and persistence around it.

pub mod retry;

mod context_gather;
mod error_fix;
mod handle;
mod logger;
mod phase_ctx;
mod planning;
mod prompts;
mod revision;
mod runtime;
mod task_impl;

pub use context_gather::{ContextGatherInput, ContextGatherWorkflow};
pub use error_fix::{ErrorItem, ErrorResolutionInput, ErrorResolutionWorkflow};
pub use handle::{PauseCause, WorkflowHandle};
pub use logger::WorkflowLogger;
pub use phase_ctx::{AgentDisposition, PhaseContext};
pub use planning::{PlanningInput, PlanningWorkflow};
pub use revision::{RevisionInput, RevisionWorkflow};
pub use runtime::run_workflow;
pub use task_impl::{TaskImplInput, TaskImplWorkflow};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::occupancy::OccupancyError;
use crate::persist::PersistError;
use crate::pool::PoolError;
use crate::runner::RunnerError;
use crate::signal_bus::SignalError;
use retry::ErrorClass;

/// What a phase asks the runtime to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Move to the next phase
    Advance,
    /// Re-enter an earlier phase (iteration loop)
    Rewind { to: usize },
}

/// Errors surfaced by phase execution.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
    #[error("agent {agent} exited without signalling completion")]
    AgentNoCallback { agent: String },
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Occupancy(#[from] OccupancyError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("interrupted by pause or cancellation")]
    Interrupted,
}

impl WorkflowError {
    /// Retry classification for the runtime's phase loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            WorkflowError::Transient(_) => ErrorClass::Transient,
            WorkflowError::Permanent(_) => ErrorClass::Permanent,
            WorkflowError::AgentNoCallback { .. } => ErrorClass::Permanent,
            WorkflowError::Signal(SignalError::AwaitTimeout { .. }) => ErrorClass::Transient,
            WorkflowError::Signal(SignalError::Cancelled { .. }) => ErrorClass::Interrupted,
            WorkflowError::Signal(_) => ErrorClass::Permanent,
            WorkflowError::Pool(PoolError::Cancelled) => ErrorClass::Interrupted,
            WorkflowError::Pool(PoolError::PoolExhausted) => ErrorClass::Transient,
            WorkflowError::Pool(_) => ErrorClass::Permanent,
            WorkflowError::Occupancy(_) => ErrorClass::Permanent,
            WorkflowError::Runner(RunnerError::Spawn(_)) => ErrorClass::Transient,
            WorkflowError::Runner(_) => ErrorClass::Transient,
            WorkflowError::Persist(_) => ErrorClass::Permanent,
            WorkflowError::Interrupted => ErrorClass::Interrupted,
        }
    }
}

/// Capability set every workflow type provides; everything else lives in the
/// runtime.
#[async_trait]
pub trait WorkflowSpec: Send + Sync {
    /// Registered type name (e.g. `task_implementation`)
    fn kind(&self) -> &'static str;

    /// Ordered phase names
    fn phases(&self) -> &'static [&'static str];

    /// Run one phase. The runtime has already passed the cancellation and
    /// pause gates and wraps this call with the retry policy.
    async fn execute_phase(
        &mut self,
        index: usize,
        ctx: &PhaseContext,
    ) -> Result<PhaseOutcome, WorkflowError>;

    /// Signal-wait timeout for this type, derived from the engine base.
    fn signal_timeout(&self, base: Duration) -> Duration {
        base
    }

    /// Structured output included in the completion event.
    fn output(&self) -> Option<serde_json::Value> {
        None
    }

    /// One-line progress message for a phase.
    fn progress_message(&self, phase: &str) -> String {
        format!("running {phase}")
    }

    /// Hook invoked once when the workflow is about to fail terminally
    /// (bookkeeping such as marking the owned task failed).
    async fn on_failure(&mut self, ctx: &PhaseContext) {
        let _ = ctx;
    }

    /// Hook invoked once when the workflow is cancelled (bookkeeping such as
    /// returning the owned task to the pending set).
    async fn on_cancel(&mut self, ctx: &PhaseContext) {
        let _ = ctx;
    }
}

impl std::fmt::Debug for dyn WorkflowSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowSpec").field("kind", &self.kind()).finish()
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow phase context: the only path through which workflow types
//! touch shared coordinator state.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apc_core::{
    CompletionSignal, ConflictResolution, ConflictScope, Event, OccupancyMode, RoleId, SessionId,
    Stage, TaskId, WorkflowId,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::handle::WorkflowHandle;
use super::logger::WorkflowLogger;
use super::prompts;
use super::WorkflowError;
use crate::continuation::ContinuationContext;
use crate::pool::PoolError;
use crate::runner::AgentInvocation;
use crate::services::Services;
use crate::signal_bus::SignalError;

/// What to do with the agent after a successful exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentDisposition {
    /// Return it to the pool
    Release,
    /// Keep it owned but idle (iteration loops)
    Bench,
}

#[derive(Clone)]
struct OccupancyClaim {
    tasks: Vec<TaskId>,
    mode: OccupancyMode,
    reason: String,
}

/// Services plus per-workflow state handed to every phase call.
pub struct PhaseContext {
    pub services: Arc<Services>,
    pub handle: Arc<WorkflowHandle>,
    pub logger: WorkflowLogger,
    /// Signal-wait timeout, derived from the workflow type at construction
    pub signal_timeout: Duration,
    continuation: Mutex<Option<ContinuationContext>>,
    files_modified: Mutex<BTreeSet<PathBuf>>,
    occupied: Mutex<Vec<OccupancyClaim>>,
}

enum AgentEvent {
    Signal(Result<CompletionSignal, SignalError>),
    Exit,
    ExitError(crate::runner::RunnerError),
    Interrupted,
}

impl PhaseContext {
    pub fn new(
        services: Arc<Services>,
        handle: Arc<WorkflowHandle>,
        logger: WorkflowLogger,
        signal_timeout: Duration,
    ) -> Self {
        Self {
            services,
            handle,
            logger,
            signal_timeout,
            continuation: Mutex::new(None),
            files_modified: Mutex::new(BTreeSet::new()),
            occupied: Mutex::new(Vec::new()),
        }
    }

    pub fn workflow_id(&self) -> WorkflowId {
        self.handle.id
    }

    pub fn session_id(&self) -> SessionId {
        self.handle.session_id
    }

    pub fn log(&self, message: &str) {
        self.logger.log(message);
    }

    /// Seed continuation context recovered from a crash or forced pause.
    pub(crate) fn seed_continuation(&self, context: ContinuationContext) {
        if !context.is_empty() {
            *self.continuation.lock() = Some(context);
        }
    }

    pub(crate) fn take_partial_output(&self) -> Option<ContinuationContext> {
        self.continuation.lock().clone()
    }

    /// Record files an agent reported modified.
    pub fn record_files(&self, files: impl IntoIterator<Item = PathBuf>) {
        self.files_modified.lock().extend(files);
    }

    pub fn files_modified(&self) -> Vec<PathBuf> {
        self.files_modified.lock().iter().cloned().collect()
    }

    // --- agents -----------------------------------------------------------

    /// The full agent exchange for one phase: allocate from the pool, spawn
    /// the subprocess with the prompt (continuation prefix and completion
    /// instructions attached), then race signal arrival, subprocess exit,
    /// and interruption.
    pub async fn run_agent(
        &self,
        role: impl Into<RoleId>,
        stage: Stage,
        task: Option<TaskId>,
        prompt: String,
        after: AgentDisposition,
    ) -> Result<CompletionSignal, WorkflowError> {
        let services = &self.services;
        let workflow = self.handle.id;
        let session = self.handle.session_id;
        let role = role.into();
        let interrupt = self.handle.interrupt_token();

        let agent = services
            .pool
            .request(workflow, role.clone(), self.handle.priority, &interrupt)
            .await
            .map_err(|e| match e {
                PoolError::Cancelled => WorkflowError::Interrupted,
                other => WorkflowError::from(other),
            })?;

        let mut full_prompt = String::new();
        if let Some(continuation) = self.continuation.lock().take() {
            full_prompt.push_str(&continuation.as_prompt_prefix());
        }
        full_prompt.push_str(&prompt);
        full_prompt.push_str(&prompts::completion_instructions(session, workflow, stage, task));

        let mut invocation = AgentInvocation::new(agent.clone(), role, session, workflow, stage)
            .prompt(full_prompt)
            .cwd(services.config.work_dir.clone())
            .log_path(services.persist.agent_log_path(session, workflow, &agent));
        if let Some(task) = task {
            invocation = invocation.task_id(task);
        }

        let mut proc = match services.runner.spawn(invocation).await {
            Ok(proc) => proc,
            Err(e) => {
                let _ = services.pool.release(&agent);
                services.nudge();
                return Err(e.into());
            }
        };

        self.log(&format!("agent {agent} dispatched for stage {stage}"));

        let event = {
            let exit = proc.wait();
            tokio::pin!(exit);
            tokio::select! {
                signal = services.signals.wait(session, workflow, stage, task, self.signal_timeout) => {
                    AgentEvent::Signal(signal)
                }
                exit = &mut exit => match exit {
                    Ok(_) => AgentEvent::Exit,
                    Err(e) => AgentEvent::ExitError(e),
                },
                _ = interrupt.cancelled() => AgentEvent::Interrupted,
            }
        };

        let result = match event {
            AgentEvent::Signal(Ok(signal)) => {
                // The subprocess exits on its own shortly after signalling;
                // reap it in the background, kill if it lingers.
                tokio::spawn(async move {
                    let lingered =
                        tokio::time::timeout(Duration::from_secs(30), proc.wait()).await;
                    if lingered.is_err() {
                        let _ = proc.kill().await;
                    }
                });
                if signal.result == apc_core::SignalResult::Failed {
                    self.log(&format!("agent {agent} reported failure for stage {stage}"));
                }
                Ok(signal)
            }
            AgentEvent::Signal(Err(e)) => {
                let _ = proc.kill().await;
                self.log(&format!("stage {stage} wait failed: {e}"));
                Err(WorkflowError::from(e))
            }
            AgentEvent::Exit => {
                // Exited before signalling. The select dropped our wait
                // future, so clear the stale awaiter and give the CLI
                // retries a short grace window to land.
                services.signals.cancel_pending(workflow, stage, task);
                match services
                    .signals
                    .wait(session, workflow, stage, task, services.config.signal_grace)
                    .await
                {
                    Ok(signal) => Ok(signal),
                    Err(SignalError::AwaitTimeout { .. }) => {
                        self.log(&format!(
                            "agent {agent} exited without completion signal"
                        ));
                        self.services.events.fire(&Event::Error {
                            message: format!("agent {agent} exited without signalling {stage}"),
                            workflow_id: Some(workflow),
                        });
                        Err(WorkflowError::AgentNoCallback { agent: agent.clone() })
                    }
                    Err(e) => Err(WorkflowError::from(e)),
                }
            }
            AgentEvent::ExitError(e) => {
                services.signals.cancel_pending(workflow, stage, task);
                Err(WorkflowError::from(e))
            }
            AgentEvent::Interrupted => {
                let partial = proc.kill().await.unwrap_or_default();
                services.signals.cancel_pending(workflow, stage, task);
                let context = ContinuationContext::extract(&partial);
                if !context.is_empty() {
                    self.log("captured continuation context from interrupted agent");
                    *self.continuation.lock() = Some(context);
                }
                Err(WorkflowError::Interrupted)
            }
        };

        match (&result, after) {
            (Ok(_), AgentDisposition::Bench) => {
                if let Err(e) = services.pool.bench(&agent) {
                    tracing::warn!(agent = %agent, error = %e, "bench failed");
                }
            }
            _ => {
                if let Err(e) = services.pool.release(&agent) {
                    tracing::warn!(agent = %agent, error = %e, "release failed");
                }
            }
        }
        services.nudge();
        result
    }

    // --- occupancy & conflicts -------------------------------------------

    /// Declare occupancy and remember the claim for pause/resume cycles.
    pub fn declare_occupancy(
        &self,
        tasks: &[TaskId],
        mode: OccupancyMode,
        reason: &str,
    ) -> Result<(), WorkflowError> {
        self.services.occupancy.declare(
            self.handle.id,
            tasks,
            mode,
            reason,
            self.services.now_ms(),
        )?;
        let mut occupied = self.occupied.lock();
        if !occupied.iter().any(|c| c.tasks == tasks && c.mode == mode) {
            occupied.push(OccupancyClaim {
                tasks: tasks.to_vec(),
                mode,
                reason: reason.to_string(),
            });
        }
        self.services.nudge();
        Ok(())
    }

    /// Release occupancy and forget the matching claims.
    pub fn release_occupancy(&self, tasks: Option<&[TaskId]>) {
        self.services.occupancy.release(self.handle.id, tasks);
        let mut occupied = self.occupied.lock();
        match tasks {
            None => occupied.clear(),
            Some(subset) => {
                for claim in occupied.iter_mut() {
                    claim.tasks.retain(|t| !subset.contains(t));
                }
                occupied.retain(|c| !c.tasks.is_empty());
            }
        }
        self.services.nudge();
    }

    pub fn declare_conflict(
        &self,
        scope: ConflictScope,
        resolution: ConflictResolution,
        reason: &str,
    ) {
        self.services.conflicts.declare(
            self.handle.id,
            scope,
            resolution,
            reason,
            self.services.now_ms(),
        );
        self.services.nudge();
    }

    pub fn clear_conflicts(&self) {
        self.services.conflicts.clear(self.handle.id);
        self.services.nudge();
    }

    // --- pause support (runtime internals) -------------------------------

    /// Drop occupancy and non-benched agents for a pause. Claims are kept so
    /// resume can re-acquire them.
    pub(crate) fn release_for_pause(&self) {
        self.services.occupancy.release(self.handle.id, None);
        self.services.pool.release_workflow(self.handle.id, false);
        self.services.nudge();
    }

    /// Re-declare remembered occupancy claims after a resume. Waits (event
    /// driven, with a polling fallback) while other workflows still hold
    /// intersecting tasks.
    pub(crate) async fn reacquire_occupancy(&self) -> Result<(), WorkflowError> {
        let claims: Vec<OccupancyClaim> = self.occupied.lock().clone();
        if claims.is_empty() {
            return Ok(());
        }
        let wake = Arc::new(Notify::new());
        let waker = Arc::clone(&wake);
        let subscription = self.services.events.subscribe(move |event| {
            if matches!(
                event,
                Event::OccupancyReleased { .. } | Event::WorkflowCompleted { .. }
            ) {
                waker.notify_one();
            }
        });

        let result = loop {
            if self.handle.is_cancelled() {
                break Err(WorkflowError::Interrupted);
            }
            let now_ms = self.services.now_ms();
            let blocked = claims.iter().find_map(|claim| {
                self.services
                    .occupancy
                    .declare(self.handle.id, &claim.tasks, claim.mode, &claim.reason, now_ms)
                    .err()
            });
            match blocked {
                None => break Ok(()),
                Some(e) => {
                    tracing::debug!(workflow = %self.handle.id, error = %e, "waiting to re-acquire occupancy");
                    let cancel_token = self.handle.cancel_token();
                    tokio::select! {
                        _ = wake.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                        _ = cancel_token.cancelled() => {}
                    }
                }
            }
        };
        subscription.dispose();
        result
    }

    /// Whether every remembered claim can be re-declared right now.
    pub(crate) fn try_reacquire(&self) -> bool {
        let claims: Vec<OccupancyClaim> = self.occupied.lock().clone();
        let now_ms = self.services.now_ms();
        claims.iter().all(|claim| {
            self.services
                .occupancy
                .declare(self.handle.id, &claim.tasks, claim.mode, &claim.reason, now_ms)
                .is_ok()
        })
    }
}

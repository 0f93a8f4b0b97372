// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The coordinator: instantiates workflows from the registry, admission-
//! controls them against conflicts and dependencies, routes completion
//! signals, and reconciles pause/resume decisions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use apc_core::{
    CompletionSignal, Event, Priority, Session, SessionId, SessionStatus, Stage, TaskId,
    TaskStatus, WorkflowId, WorkflowProgress, WorkflowRecord, WorkflowStatus,
};
use parking_lot::Mutex;
use thiserror::Error;

use crate::event_bus::Subscription;
use crate::persist::PersistError;
use crate::pool::{PoolError, PoolStatus};
use crate::registry::{RegistryError, WorkflowRegistry};
use crate::services::Services;
use crate::signal_bus::{Delivery, SignalError};
use crate::workflow::{run_workflow, PauseCause, WorkflowHandle, WorkflowSpec};

/// Errors surfaced by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(WorkflowId),
    #[error("session {id} is {status}; {action} not allowed")]
    BadSessionStatus {
        id: SessionId,
        status: SessionStatus,
        action: &'static str,
    },
    #[error("session {0} still has active workflows")]
    SessionBusy(SessionId),
    #[error("task {task} is {status}; only failed tasks can be retried")]
    TaskNotRetryable { task: TaskId, status: TaskStatus },
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
    #[error("coordinator is degraded after a persistence failure; new work refused")]
    Degraded,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Plan(#[from] apc_plan::PlanError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Options for [`Coordinator::dispatch_workflow`].
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub priority: Priority,
}

impl DispatchOptions {
    apc_core::setters! {
        set {
            priority: Priority,
        }
    }
}

/// Snapshot returned by [`Coordinator::get_session_state`].
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: Session,
    /// Records of admitted (running/paused/blocked/terminal) workflows
    pub active: Vec<WorkflowRecord>,
    /// Ids still waiting for admission
    pub pending: Vec<WorkflowId>,
}

struct WorkflowEntry {
    handle: Arc<WorkflowHandle>,
    record: Arc<Mutex<WorkflowRecord>>,
    /// Present until admission; the spawned runtime takes it
    spec: Option<Box<dyn WorkflowSpec>>,
    seq: u64,
}

impl WorkflowEntry {
    fn record(&self) -> WorkflowRecord {
        self.record.lock().clone()
    }

    fn is_pending(&self) -> bool {
        self.spec.is_some()
    }
}

#[derive(Default)]
struct CoordState {
    sessions: HashMap<SessionId, Session>,
    workflows: HashMap<WorkflowId, WorkflowEntry>,
    next_seq: u64,
    degraded: bool,
}

/// The coordinator facade. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Coordinator {
    services: Arc<Services>,
    registry: WorkflowRegistry,
    state: Arc<Mutex<CoordState>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl Coordinator {
    pub fn new(services: Arc<Services>, registry: WorkflowRegistry) -> Self {
        Self {
            services,
            registry,
            state: Arc::new(Mutex::new(CoordState::default())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Reload persisted sessions and reconstitute non-terminal workflows in
    /// `paused` state for the user to explicitly resume.
    pub fn recover(&self) -> Result<usize, CoordinatorError> {
        let sessions = self.services.persist.load_sessions()?;
        let records = self.services.persist.load_workflows()?;
        let mut recovered = 0;

        {
            let mut state = self.state.lock();
            for session in sessions {
                state.sessions.insert(session.id, session);
            }
        }

        // Rebuild each session's task registry from its current plan so that
        // recovered workflows find their tasks.
        let session_ids: Vec<SessionId> = self.state.lock().sessions.keys().copied().collect();
        for session_id in session_ids {
            let plan_path = self.services.persist.plan_path(session_id);
            if plan_path.exists() {
                match apc_plan::parse_plan_file(&plan_path) {
                    Ok(plan) => {
                        self.services.tasks.load_from_plan(&plan);
                    }
                    Err(e) => {
                        tracing::warn!(session = %session_id, error = %e, "plan unreadable at recovery")
                    }
                }
            }
        }

        for mut record in records {
            if record.status.is_terminal() {
                continue;
            }
            let spec = match self.registry.create(
                &record.kind,
                record.input.clone(),
                &self.services.config,
            ) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::warn!(workflow = %record.id, error = %e, "cannot reconstitute workflow");
                    continue;
                }
            };
            record.status = WorkflowStatus::Paused;
            let handle = Arc::new(WorkflowHandle::new(
                record.id,
                record.session_id,
                record.kind.clone(),
                record.priority,
                true,
            ));
            handle.set_status(WorkflowStatus::Paused);
            let _ = self.services.persist.save_workflow(&record);
            let shared = Arc::new(Mutex::new(record));
            let entry = WorkflowEntry {
                handle: Arc::clone(&handle),
                record: Arc::clone(&shared),
                spec: None,
                seq: self.next_seq(),
            };
            self.state.lock().workflows.insert(handle.id, entry);
            // Spawned immediately; parks at the pause gate until resumed
            tokio::spawn(run_workflow(spec, handle, Arc::clone(&self.services), shared));
            recovered += 1;
        }

        tracing::info!(recovered, "coordinator recovery complete");
        Ok(recovered)
    }

    /// Subscribe internal listeners and start the reconciliation loop.
    pub fn start(&self) {
        let nudger = Arc::clone(&self.services);
        let completion_coordinator = self.clone();
        let subscription = self.services.events.subscribe(move |event| match event {
            Event::AgentReleased { .. } => nudger.nudge(),
            Event::TaskStatusChanged { id, status, .. } => {
                if *status == TaskStatus::Completed {
                    // Tick the checklist line so restarts see the task done
                    if let Err(e) =
                        nudger.persist.mark_task_checked(id.session_id(), *id)
                    {
                        tracing::warn!(task = %id, error = %e, "plan checklist update failed");
                    }
                }
                nudger.nudge();
            }
            Event::WorkflowCompleted { id, session_id, success, .. } => {
                completion_coordinator.on_workflow_terminal(*id, *session_id, *success);
            }
            _ => {}
        });
        self.subscriptions.lock().push(subscription);

        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                // Event-driven with a slow tick fallback
                let notified = coordinator.services.reconcile.notified();
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                coordinator.reconcile_once();
            }
        });
    }

    fn next_seq(&self) -> u64 {
        let mut state = self.state.lock();
        state.next_seq += 1;
        state.next_seq
    }

    // --- reconciliation ---------------------------------------------------

    /// One reconciliation pass (also exposed as `coordinator.evaluate`).
    pub fn reconcile_once(&self) {
        let mut to_pause: Vec<Arc<WorkflowHandle>> = Vec::new();
        let mut to_resume: Vec<Arc<WorkflowHandle>> = Vec::new();

        {
            let conflicts = self.services.conflicts.all();
            let state = self.state.lock();
            // Conflicts act within the declarer's session only
            let declarer_session = |id: WorkflowId| {
                state.workflows.get(&id).map(|e| e.handle.session_id)
            };
            for entry in state.workflows.values() {
                let status = entry.handle.status();
                let occupied = self
                    .services
                    .occupancy
                    .tasks_occupied_by(entry.handle.id);
                let pause_required = conflicts.iter().any(|d| {
                    d.workflow_id != entry.handle.id
                        && d.resolution == apc_core::ConflictResolution::PauseOthers
                        && declarer_session(d.workflow_id) == Some(entry.handle.session_id)
                        && d.scope.intersects(occupied.iter())
                });
                match status {
                    WorkflowStatus::Running if pause_required => {
                        to_pause.push(Arc::clone(&entry.handle));
                    }
                    WorkflowStatus::Blocked if !pause_required => {
                        // Only reconciliation-paused workflows auto-resume
                        if entry.handle.pause_requested() == Some(PauseCause::Conflict) {
                            to_resume.push(Arc::clone(&entry.handle));
                        }
                    }
                    _ => {}
                }
            }
        }

        for handle in to_pause {
            tracing::info!(workflow = %handle.id, "conflict reconciliation: forcing pause");
            handle.request_pause(PauseCause::Conflict, true);
        }
        for handle in to_resume {
            tracing::info!(workflow = %handle.id, "conflict cleared: resuming");
            handle.resume();
        }

        self.admit_pending();
    }

    /// Admit pending workflows in (priority, FIFO) order while the pool has
    /// capacity.
    fn admit_pending(&self) {
        let mut budget = self.services.pool.status().available;
        if budget == 0 {
            return;
        }

        let candidates: Vec<WorkflowId> = {
            let state = self.state.lock();
            let mut pending: Vec<(&WorkflowId, &WorkflowEntry)> = state
                .workflows
                .iter()
                .filter(|(_, e)| e.is_pending())
                .collect();
            pending.sort_by_key(|(_, e)| (e.handle.priority, e.seq));
            pending.into_iter().map(|(id, _)| *id).collect()
        };

        for id in candidates {
            if budget == 0 {
                break;
            }
            let admissible = {
                let state = self.state.lock();
                let Some(entry) = state.workflows.get(&id) else { continue };
                self.admissible(&state, entry)
            };
            if !admissible {
                continue;
            }
            let spawned = {
                let mut state = self.state.lock();
                let Some(entry) = state.workflows.get_mut(&id) else { continue };
                entry.spec.take().map(|spec| {
                    (spec, Arc::clone(&entry.handle), Arc::clone(&entry.record))
                })
            };
            if let Some((spec, handle, record)) = spawned {
                tracing::info!(workflow = %id, kind = %handle.kind, "admitting workflow");
                self.services.events.fire(&Event::WorkflowStarted {
                    id,
                    kind: handle.kind.clone(),
                    session_id: handle.session_id,
                });
                tokio::spawn(run_workflow(spec, handle, Arc::clone(&self.services), record));
                budget -= 1;
            }
        }
    }

    fn admissible(&self, state: &CoordState, entry: &WorkflowEntry) -> bool {
        let session_id = entry.handle.session_id;

        // A blocking revision gates new non-revision admissions in its session
        let revision_active = state.workflows.values().any(|e| {
            e.handle.session_id == session_id
                && e.handle.kind == "plan_revision"
                && !e.is_pending()
                && !e.handle.status().is_terminal()
        });
        if revision_active && entry.handle.kind != "plan_revision" {
            return false;
        }

        // Task workflows wait for dependency readiness
        if entry.handle.kind == "task_implementation" {
            if let Some(task) = task_of_record(&entry.record()) {
                let ready = self.services.tasks.ready_tasks(session_id);
                if !ready.contains(&task) {
                    return false;
                }
            }
        }
        true
    }

    /// Session bookkeeping when a workflow reaches a terminal status.
    fn on_workflow_terminal(&self, id: WorkflowId, session_id: SessionId, success: bool) {
        let kind = {
            let state = self.state.lock();
            match state.workflows.get(&id) {
                Some(entry) => entry.handle.kind.clone(),
                None => return,
            }
        };
        let status = self.session_status(session_id);

        match (kind.as_str(), success) {
            ("planning", true) => {
                if status == Some(SessionStatus::Debating) {
                    self.set_session_status(session_id, SessionStatus::Reviewing);
                }
            }
            ("plan_revision", true) => {
                if status == Some(SessionStatus::Revising) {
                    // Back to execution if the revision interrupted it,
                    // otherwise back to user review
                    let executing = {
                        let state = self.state.lock();
                        state.workflows.values().any(|e| {
                            e.handle.session_id == session_id
                                && e.handle.kind == "task_implementation"
                                && (e.is_pending() || !e.handle.status().is_terminal())
                        })
                    };
                    let next = if executing {
                        SessionStatus::Executing
                    } else {
                        SessionStatus::Reviewing
                    };
                    self.set_session_status(session_id, next);
                }
            }
            ("planning" | "plan_revision", false) => {
                // Mid-planning failure cancels the session unless the failure
                // came from an explicit stop
                if status.map(|s| s.is_planning()).unwrap_or(false) {
                    let cancelled = self
                        .state
                        .lock()
                        .workflows
                        .get(&id)
                        .map(|e| e.handle.status() == WorkflowStatus::Cancelled)
                        .unwrap_or(false);
                    if !cancelled {
                        self.set_session_status(session_id, SessionStatus::Cancelled);
                    }
                }
            }
            ("task_implementation", true) => {
                if self.services.tasks.all_completed(session_id)
                    && status == Some(SessionStatus::Executing)
                {
                    self.set_session_status(session_id, SessionStatus::Completed);
                }
            }
            ("task_implementation", false) => {
                let cancelled = self
                    .state
                    .lock()
                    .workflows
                    .get(&id)
                    .map(|e| e.handle.status() == WorkflowStatus::Cancelled)
                    .unwrap_or(false);
                if !cancelled && status == Some(SessionStatus::Executing) {
                    self.set_session_status(session_id, SessionStatus::Stopped);
                    self.pause_session_workflows(session_id);
                }
            }
            _ => {}
        }
    }

    // --- dispatch ---------------------------------------------------------

    /// Construct a workflow, enqueue it, and return its id immediately.
    pub fn dispatch_workflow(
        &self,
        session_id: SessionId,
        kind: &str,
        input: serde_json::Value,
        options: DispatchOptions,
    ) -> Result<WorkflowId, CoordinatorError> {
        {
            let state = self.state.lock();
            if state.degraded {
                return Err(CoordinatorError::Degraded);
            }
            if !state.sessions.contains_key(&session_id) {
                return Err(CoordinatorError::UnknownSession(session_id));
            }
        }

        let spec = self
            .registry
            .create(kind, input.clone(), &self.services.config)?;
        let id = WorkflowId::new();
        let handle = Arc::new(WorkflowHandle::new(
            id,
            session_id,
            kind,
            options.priority,
            false,
        ));
        let record = WorkflowRecord {
            id,
            kind: kind.to_string(),
            session_id,
            status: WorkflowStatus::Pending,
            priority: options.priority,
            phase_index: 0,
            phase_name: spec
                .phases()
                .first()
                .copied()
                .unwrap_or_default()
                .to_string(),
            input,
            partial_output: None,
            files_modified: Vec::new(),
            error: None,
            updated_at_ms: self.services.now_ms(),
        };
        if let Err(e) = self.services.persist.save_workflow(&record) {
            self.enter_degraded(&e);
            return Err(e.into());
        }

        let seq = self.next_seq();
        let entry = WorkflowEntry {
            handle,
            record: Arc::new(Mutex::new(record)),
            spec: Some(spec),
            seq,
        };
        self.state.lock().workflows.insert(id, entry);
        self.services.nudge();
        Ok(id)
    }

    fn enter_degraded(&self, error: &PersistError) {
        tracing::error!(error = %error, "persistence medium failed; entering degraded mode");
        self.state.lock().degraded = true;
        self.services.events.fire(&Event::Error {
            message: format!("degraded mode: {error}"),
            workflow_id: None,
        });
    }

    // --- sessions ---------------------------------------------------------

    /// Create a session and dispatch its planning workflow.
    pub fn create_session(
        &self,
        requirement: &str,
    ) -> Result<(SessionId, WorkflowId), CoordinatorError> {
        if self.state.lock().degraded {
            return Err(CoordinatorError::Degraded);
        }
        let session = Session::new(SessionId::new(), requirement, self.services.now_ms());
        let session_id = session.id;
        if let Err(e) = self.services.persist.save_session(&session) {
            self.enter_degraded(&e);
            return Err(e.into());
        }
        self.state.lock().sessions.insert(session_id, session);
        self.fire_session_updated(session_id, SessionStatus::Debating);

        let workflow_id = self.dispatch_workflow(
            session_id,
            "planning",
            serde_json::json!({ "requirement": requirement }),
            DispatchOptions::default(),
        )?;
        Ok((session_id, workflow_id))
    }

    /// Approve the reviewed plan: validate, back up, load tasks.
    pub fn approve_plan(&self, session_id: SessionId) -> Result<usize, CoordinatorError> {
        self.require_session_status(session_id, SessionStatus::Reviewing, "plan.approve")?;
        let plan_path = self.services.persist.plan_path(session_id);
        let plan = apc_plan::parse_plan_file(&plan_path)?;
        self.services
            .persist
            .backup_plan(session_id, self.services.now_ms())?;
        let loaded = self.services.tasks.load_from_plan(&plan);
        {
            let mut state = self.state.lock();
            if let Some(session) = state.sessions.get_mut(&session_id) {
                // The active plan path is stable; approval after a revision
                // only bumps the version
                if session.plan_path.is_none() {
                    session.set_plan(plan_path, self.services.now_ms());
                } else {
                    session.plan_version += 1;
                    session.updated_at_ms = self.services.now_ms();
                }
            }
        }
        self.set_session_status(session_id, SessionStatus::Approved);
        Ok(loaded.len())
    }

    /// Dispatch a blocking revision workflow.
    pub fn revise_plan(
        &self,
        session_id: SessionId,
        instruction: &str,
    ) -> Result<WorkflowId, CoordinatorError> {
        let status = self
            .session_status(session_id)
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        if !matches!(
            status,
            SessionStatus::Reviewing | SessionStatus::Approved | SessionStatus::Executing
                | SessionStatus::Paused
        ) {
            return Err(CoordinatorError::BadSessionStatus {
                id: session_id,
                status,
                action: "plan.revise",
            });
        }
        let id = self.dispatch_workflow(
            session_id,
            "plan_revision",
            serde_json::json!({ "instruction": instruction }),
            DispatchOptions::default().priority(Priority::REVISION),
        )?;
        self.set_session_status(session_id, SessionStatus::Revising);
        Ok(id)
    }

    /// Cancel planning-side work (plan.cancel).
    pub fn cancel_planning(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        let status = self
            .session_status(session_id)
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        if !status.is_planning() {
            return Err(CoordinatorError::BadSessionStatus {
                id: session_id,
                status,
                action: "plan.cancel",
            });
        }
        self.cancel_session_workflows(session_id);
        self.set_session_status(session_id, SessionStatus::Cancelled);
        Ok(())
    }

    /// Abandon the current planning attempt and start over (plan.restart).
    pub fn restart_planning(&self, session_id: SessionId) -> Result<WorkflowId, CoordinatorError> {
        let requirement = {
            let state = self.state.lock();
            let session = state
                .sessions
                .get(&session_id)
                .ok_or(CoordinatorError::UnknownSession(session_id))?;
            if !session.status.is_planning() {
                return Err(CoordinatorError::BadSessionStatus {
                    id: session_id,
                    status: session.status,
                    action: "plan.restart",
                });
            }
            session.requirement.clone()
        };
        self.cancel_session_workflows(session_id);
        self.set_session_status(session_id, SessionStatus::Debating);
        self.dispatch_workflow(
            session_id,
            "planning",
            serde_json::json!({ "requirement": requirement }),
            DispatchOptions::default(),
        )
    }

    /// Parse the approved plan and dispatch one implementation workflow per
    /// remaining task, respecting dependency readiness.
    pub fn start_execution(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<WorkflowId>, CoordinatorError> {
        let status = self
            .session_status(session_id)
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        if !matches!(status, SessionStatus::Approved | SessionStatus::Stopped) {
            return Err(CoordinatorError::BadSessionStatus {
                id: session_id,
                status,
                action: "exec.start",
            });
        }

        let plan_path = self.services.persist.plan_path(session_id);
        let plan = apc_plan::parse_plan_file(&plan_path)?;
        self.services.tasks.load_from_plan(&plan);

        // Tasks already covered by a live workflow keep it
        let covered: Vec<TaskId> = {
            let state = self.state.lock();
            state
                .workflows
                .values()
                .filter(|e| {
                    e.handle.session_id == session_id
                        && e.handle.kind == "task_implementation"
                        && (e.is_pending() || !e.handle.status().is_terminal())
                })
                .filter_map(|e| task_of_record(&e.record()))
                .collect()
        };

        let mut dispatched = Vec::new();
        for task in self.services.tasks.list_by_session(session_id) {
            if task.status == TaskStatus::Completed || covered.contains(&task.id) {
                continue;
            }
            let id = self.dispatch_workflow(
                session_id,
                "task_implementation",
                serde_json::json!({ "task_id": task.id.as_str() }),
                DispatchOptions::default(),
            )?;
            dispatched.push(id);
        }

        self.set_session_status(session_id, SessionStatus::Executing);
        Ok(dispatched)
    }

    /// Cooperative pause of every workflow in a session.
    pub fn pause_session(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        if self.session_status(session_id).is_none() {
            return Err(CoordinatorError::UnknownSession(session_id));
        }
        self.pause_session_workflows(session_id);
        if self.session_status(session_id) == Some(SessionStatus::Executing) {
            self.set_session_status(session_id, SessionStatus::Paused);
        }
        Ok(())
    }

    fn pause_session_workflows(&self, session_id: SessionId) {
        let handles: Vec<Arc<WorkflowHandle>> = {
            let state = self.state.lock();
            state
                .workflows
                .values()
                .filter(|e| {
                    e.handle.session_id == session_id && !e.handle.status().is_terminal()
                })
                .map(|e| Arc::clone(&e.handle))
                .collect()
        };
        for handle in handles {
            handle.request_pause(PauseCause::User, false);
        }
        self.services.nudge();
    }

    /// Resume every paused workflow in a session.
    pub fn resume_session(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        let status = self
            .session_status(session_id)
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        let handles: Vec<Arc<WorkflowHandle>> = {
            let state = self.state.lock();
            state
                .workflows
                .values()
                .filter(|e| {
                    e.handle.session_id == session_id
                        && e.handle.pause_requested() == Some(PauseCause::User)
                })
                .map(|e| Arc::clone(&e.handle))
                .collect()
        };
        for handle in handles {
            handle.resume();
        }
        if matches!(status, SessionStatus::Paused | SessionStatus::Stopped) {
            self.set_session_status(session_id, SessionStatus::Executing);
        }
        self.services.nudge();
        Ok(())
    }

    /// Stop a session: cancel its workflows, then apply the interruption
    /// policy (planning → cancelled, execution → stopped).
    pub fn stop_session(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        let status = self
            .session_status(session_id)
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        self.cancel_session_workflows(session_id);
        if !status.is_terminal() {
            self.set_session_status(session_id, status.interrupted());
        }
        Ok(())
    }

    fn cancel_session_workflows(&self, session_id: SessionId) {
        let entries: Vec<(Arc<WorkflowHandle>, bool)> = {
            let mut state = self.state.lock();
            let ids: Vec<WorkflowId> = state
                .workflows
                .iter()
                .filter(|(_, e)| {
                    e.handle.session_id == session_id && !e.handle.status().is_terminal()
                })
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let entry = state.workflows.get_mut(&id)?;
                    let was_pending = entry.spec.take().is_some();
                    Some((Arc::clone(&entry.handle), was_pending))
                })
                .collect()
        };
        for (handle, was_pending) in entries {
            handle.cancel();
            if was_pending {
                // Never admitted: no runtime task will run its terminal path
                handle.set_status(WorkflowStatus::Cancelled);
                let record = {
                    let state = self.state.lock();
                    state.workflows.get(&handle.id).map(|e| {
                        let mut record = e.record.lock();
                        record.status = WorkflowStatus::Cancelled;
                        record.clone()
                    })
                };
                if let Some(record) = record {
                    let _ = self.services.persist.save_workflow(&record);
                }
            }
        }
        self.services.nudge();
    }

    /// Remove a terminal session and its persisted state.
    pub fn remove_session(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        {
            let state = self.state.lock();
            if !state.sessions.contains_key(&session_id) {
                return Err(CoordinatorError::UnknownSession(session_id));
            }
            let busy = state.workflows.values().any(|e| {
                e.handle.session_id == session_id
                    && (e.is_pending() || !e.handle.status().is_terminal())
            });
            if busy {
                return Err(CoordinatorError::SessionBusy(session_id));
            }
        }
        {
            let mut state = self.state.lock();
            state.sessions.remove(&session_id);
            state
                .workflows
                .retain(|_, e| e.handle.session_id != session_id);
        }
        self.services.persist.remove_session(session_id)?;
        Ok(())
    }

    /// Create a fresh implementation workflow for a failed task
    /// (workflow.retry).
    pub fn retry_task(
        &self,
        session_id: SessionId,
        task: TaskId,
    ) -> Result<WorkflowId, CoordinatorError> {
        let current = self
            .services
            .tasks
            .get(task)
            .ok_or(CoordinatorError::UnknownTask(task))?;
        if current.status != TaskStatus::Failed {
            return Err(CoordinatorError::TaskNotRetryable { task, status: current.status });
        }
        let _ = self
            .services
            .tasks
            .mark_status(task, TaskStatus::Pending, Some("retrying"));
        let id = self.dispatch_workflow(
            session_id,
            "task_implementation",
            serde_json::json!({ "task_id": task.as_str() }),
            DispatchOptions::default(),
        )?;
        if self.session_status(session_id) == Some(SessionStatus::Stopped) {
            self.set_session_status(session_id, SessionStatus::Executing);
        }
        Ok(id)
    }

    // --- signals ----------------------------------------------------------

    /// Deliver an agent CLI callback (agent.complete).
    pub fn deliver_completion(
        &self,
        signal: CompletionSignal,
    ) -> Result<Delivery, CoordinatorError> {
        {
            let state = self.state.lock();
            if !state.sessions.contains_key(&signal.session_id) {
                return Err(CoordinatorError::UnknownSession(signal.session_id));
            }
            if !state.workflows.contains_key(&signal.workflow_id) {
                return Err(CoordinatorError::UnknownWorkflow(signal.workflow_id));
            }
        }
        Ok(self.services.signals.deliver(signal)?)
    }

    /// Pass-through signal wait for embedding callers.
    pub async fn wait_for_agent_completion(
        &self,
        workflow_id: WorkflowId,
        stage: Stage,
        timeout: Duration,
        task: Option<TaskId>,
    ) -> Result<CompletionSignal, CoordinatorError> {
        let session_id = {
            let state = self.state.lock();
            state
                .workflows
                .get(&workflow_id)
                .map(|e| e.handle.session_id)
                .ok_or(CoordinatorError::UnknownWorkflow(workflow_id))?
        };
        Ok(self
            .services
            .signals
            .wait(session_id, workflow_id, stage, task, timeout)
            .await?)
    }

    // --- queries ----------------------------------------------------------

    pub fn list_sessions(&self) -> Vec<Session> {
        let state = self.state.lock();
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at_ms);
        sessions
    }

    pub fn get_session_state(
        &self,
        session_id: SessionId,
    ) -> Result<SessionState, CoordinatorError> {
        let state = self.state.lock();
        let session = state
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        let mut active = Vec::new();
        let mut pending = Vec::new();
        for (id, entry) in &state.workflows {
            if entry.handle.session_id != session_id {
                continue;
            }
            if entry.is_pending() {
                pending.push(*id);
            } else {
                active.push(entry.record());
            }
        }
        active.sort_by_key(|r| r.updated_at_ms);
        pending.sort();
        Ok(SessionState { session, active, pending })
    }

    pub fn workflow_record(&self, id: WorkflowId) -> Option<WorkflowRecord> {
        self.state.lock().workflows.get(&id).map(|e| e.record())
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.services.pool.status()
    }

    /// Resize the pool and persist the new size for the next start.
    pub fn resize_pool(&self, size: usize) -> Result<(), CoordinatorError> {
        self.services.pool.resize(size)?;
        if let Err(e) = self
            .services
            .persist
            .save_pool_size(&self.services.config.project_root, size)
        {
            tracing::warn!(error = %e, "pool size not persisted");
        }
        self.services.nudge();
        Ok(())
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }

    /// Counts for the daemon status response.
    pub fn workflow_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        let pending = state.workflows.values().filter(|e| e.is_pending()).count();
        let active = state
            .workflows
            .values()
            .filter(|e| !e.is_pending() && !e.handle.status().is_terminal())
            .count();
        (active, pending)
    }

    // --- callbacks --------------------------------------------------------

    /// Subscribe to workflow completion events.
    pub fn on_workflow_complete(
        &self,
        callback: impl Fn(WorkflowId, bool, Option<&str>) + Send + Sync + 'static,
    ) -> Subscription {
        self.services.events.subscribe(move |event| {
            if let Event::WorkflowCompleted { id, success, error, .. } = event {
                callback(*id, *success, error.as_deref());
            }
        })
    }

    /// Subscribe to workflow progress events.
    pub fn on_workflow_progress(
        &self,
        callback: impl Fn(&WorkflowProgress) + Send + Sync + 'static,
    ) -> Subscription {
        self.services.events.subscribe(move |event| {
            if let Event::WorkflowProgressed { progress } = event {
                callback(progress);
            }
        })
    }

    // --- helpers ----------------------------------------------------------

    fn session_status(&self, session_id: SessionId) -> Option<SessionStatus> {
        self.state.lock().sessions.get(&session_id).map(|s| s.status)
    }

    fn require_session_status(
        &self,
        session_id: SessionId,
        required: SessionStatus,
        action: &'static str,
    ) -> Result<(), CoordinatorError> {
        let status = self
            .session_status(session_id)
            .ok_or(CoordinatorError::UnknownSession(session_id))?;
        if status != required {
            return Err(CoordinatorError::BadSessionStatus { id: session_id, status, action });
        }
        Ok(())
    }

    fn set_session_status(&self, session_id: SessionId, status: SessionStatus) {
        let updated = {
            let mut state = self.state.lock();
            match state.sessions.get_mut(&session_id) {
                Some(session) if session.status != status => {
                    if !session.status.can_transition(status) {
                        tracing::warn!(
                            session = %session_id,
                            from = %session.status,
                            to = %status,
                            "suppressing invalid session transition"
                        );
                        return;
                    }
                    session.status = status;
                    session.updated_at_ms = self.services.now_ms();
                    Some(session.clone())
                }
                _ => None,
            }
        };
        if let Some(session) = updated {
            if let Err(e) = self.services.persist.save_session(&session) {
                self.enter_degraded(&e);
            }
            self.fire_session_updated(session_id, status);
        }
    }

    fn fire_session_updated(&self, session_id: SessionId, status: SessionStatus) {
        self.services.events.fire(&Event::SessionUpdated { id: session_id, status });
    }
}

fn task_of_record(record: &WorkflowRecord) -> Option<TaskId> {
    record
        .input
        .get("task_id")
        .and_then(|v| v.as_str())
        .map(TaskId::from_string)
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;

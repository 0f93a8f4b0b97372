// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared per-workflow control handle.
//!
//! The coordinator holds one handle per workflow to request pause, resume,
//! and cancellation; the runtime observes it at every suspension point.

use apc_core::{Priority, SessionId, WorkflowId, WorkflowStatus};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

/// Why a workflow was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCause {
    /// Explicit user request; resumes only on request
    User,
    /// Conflict reconciliation; resumes when conflicts clear
    Conflict,
}

struct PauseState {
    requested: bool,
    cause: PauseCause,
}

/// Control surface shared between coordinator and runtime.
pub struct WorkflowHandle {
    pub id: WorkflowId,
    pub session_id: SessionId,
    pub kind: String,
    pub priority: Priority,
    status_tx: watch::Sender<WorkflowStatus>,
    pause: Mutex<PauseState>,
    resume_notify: Notify,
    /// Cancels the whole workflow
    cancel: CancellationToken,
    /// Child of `cancel`; additionally cancelled by a forced pause to kill
    /// the in-flight agent subprocess. Refreshed on resume.
    interrupt: Mutex<CancellationToken>,
}

impl WorkflowHandle {
    pub fn new(
        id: WorkflowId,
        session_id: SessionId,
        kind: impl Into<String>,
        priority: Priority,
        start_paused: bool,
    ) -> Self {
        let (status_tx, _) = watch::channel(WorkflowStatus::Pending);
        let cancel = CancellationToken::new();
        let interrupt = cancel.child_token();
        Self {
            id,
            session_id,
            kind: kind.into(),
            priority,
            status_tx,
            pause: Mutex::new(PauseState { requested: start_paused, cause: PauseCause::User }),
            resume_notify: Notify::new(),
            cancel,
            interrupt: Mutex::new(interrupt),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        *self.status_tx.borrow()
    }

    pub(crate) fn set_status(&self, status: WorkflowStatus) {
        self.status_tx.send_replace(status);
    }

    /// Watch for status changes (used by tests and the coordinator).
    pub fn status_watch(&self) -> watch::Receiver<WorkflowStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the workflow reaches a terminal status.
    pub async fn wait_terminal(&self) -> WorkflowStatus {
        let mut rx = self.status_tx.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if rx.changed().await.is_err() {
                return self.status();
            }
        }
    }

    /// Ask the workflow to pause. Forced pause also kills the in-flight
    /// agent subprocess via the interrupt token.
    pub fn request_pause(&self, cause: PauseCause, forced: bool) {
        {
            let mut pause = self.pause.lock();
            pause.requested = true;
            pause.cause = cause;
        }
        if forced {
            self.interrupt.lock().cancel();
        }
    }

    /// Clear the pause request and wake the runtime.
    pub fn resume(&self) {
        self.pause.lock().requested = false;
        self.resume_notify.notify_waiters();
        self.resume_notify.notify_one();
    }

    pub fn pause_requested(&self) -> Option<PauseCause> {
        let pause = self.pause.lock();
        pause.requested.then_some(pause.cause)
    }

    pub(crate) async fn wait_resume(&self) {
        self.resume_notify.notified().await;
    }

    /// Cancel the workflow; propagates to the interrupt token.
    pub fn cancel(&self) {
        self.cancel.cancel();
        // A paused workflow must wake to observe the cancellation
        self.resume_notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current interrupt token for in-flight agent supervision.
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.lock().clone()
    }

    /// Install a fresh interrupt token after a forced pause resumed.
    pub(crate) fn refresh_interrupt(&self) {
        let mut interrupt = self.interrupt.lock();
        if interrupt.is_cancelled() && !self.cancel.is_cancelled() {
            *interrupt = self.cancel.child_token();
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The base workflow runtime: drives a [`WorkflowSpec`]'s phase list with
//! retry, pause/resume, cancellation, progress emission, and persistence.

use std::sync::Arc;

use apc_core::{
    Event, WorkflowProgress, WorkflowRecord, WorkflowStatus,
};
use parking_lot::Mutex;

use super::handle::{PauseCause, WorkflowHandle};
use super::logger::WorkflowLogger;
use super::phase_ctx::PhaseContext;
use super::retry::ErrorClass;
use super::{PhaseOutcome, WorkflowSpec};
use crate::continuation::ContinuationContext;
use crate::services::Services;

/// Drive one workflow to a terminal status.
///
/// The shared `record` is the coordinator's live view; it is persisted at
/// every status transition and phase boundary.
pub async fn run_workflow(
    mut spec: Box<dyn WorkflowSpec>,
    handle: Arc<WorkflowHandle>,
    services: Arc<Services>,
    record: Arc<Mutex<WorkflowRecord>>,
) {
    let started_at_ms = services.now_ms();
    let log_path = services
        .persist
        .workflow_log_path(handle.session_id, handle.id);
    let logger = WorkflowLogger::new(handle.id, log_path, services.clock.clone());
    let timeout = spec.signal_timeout(services.config.signal_timeout);
    let ctx = PhaseContext::new(Arc::clone(&services), Arc::clone(&handle), logger, timeout);

    // Continuation context persisted before a crash or forced pause
    {
        let partial = record.lock().partial_output.clone();
        if let Some(partial) = partial {
            let context = serde_json::from_str::<ContinuationContext>(&partial)
                .unwrap_or_else(|_| ContinuationContext::extract(&partial));
            ctx.seed_continuation(context);
        }
    }

    let phases = spec.phases();
    let total = phases.len();
    let mut index = record.lock().phase_index.min(total.saturating_sub(1));

    if handle.pause_requested().is_none() {
        transition(&services, &handle, &record, &ctx, spec.as_ref(), WorkflowStatus::Running, None);
        ctx.log(&format!("workflow {} started ({})", handle.id, spec.kind()));
    }

    'phases: while index < total {
        if handle.is_cancelled() {
            finish(
                &services, &handle, &record, &ctx, spec.as_mut(),
                WorkflowStatus::Cancelled, None, started_at_ms,
            )
            .await;
            return;
        }

        if let Some(cause) = handle.pause_requested() {
            if !hold_paused(&services, &handle, &record, &ctx, spec.as_ref(), cause).await {
                finish(
                    &services, &handle, &record, &ctx, spec.as_mut(),
                    WorkflowStatus::Cancelled, None, started_at_ms,
                )
                .await;
                return;
            }
            continue 'phases;
        }

        // Phase boundary: persist position, announce
        let phase = phases[index];
        {
            let mut record = record.lock();
            record.phase_index = index;
            record.phase_name = phase.to_string();
        }
        save(&services, &record);
        emit_progress(&services, &handle, &record, &ctx, spec.as_ref(), spec.progress_message(phase));

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match spec.execute_phase(index, &ctx).await {
                Ok(PhaseOutcome::Advance) => {
                    record.lock().files_modified = ctx.files_modified();
                    index += 1;
                    continue 'phases;
                }
                Ok(PhaseOutcome::Rewind { to }) => {
                    ctx.log(&format!("looping back to phase {} ({})", to, phases[to]));
                    {
                        let mut record = record.lock();
                        record.phase_index = to;
                        record.phase_name = phases[to].to_string();
                    }
                    // The rewind record carries the rewound index
                    emit_progress(
                        &services, &handle, &record, &ctx, spec.as_ref(),
                        format!("looping back to {}", phases[to]),
                    );
                    index = to;
                    continue 'phases;
                }
                Err(e) => match e.class() {
                    ErrorClass::Interrupted => {
                        save_partial(&record, &ctx);
                        save(&services, &record);
                        continue 'phases;
                    }
                    ErrorClass::Transient if services.config.retry.should_retry(attempt) => {
                        let delay = services.config.retry.delay(attempt);
                        ctx.log(&format!(
                            "phase {phase} attempt {attempt} failed ({e}), retrying in {delay:?}"
                        ));
                        let cancel_token = handle.cancel_token();
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel_token.cancelled() => {}
                        }
                    }
                    _ => {
                        ctx.log(&format!("phase {phase} failed: {e}"));
                        finish(
                            &services, &handle, &record, &ctx, spec.as_mut(),
                            WorkflowStatus::Failed, Some(e.to_string()), started_at_ms,
                        )
                        .await;
                        return;
                    }
                },
            }
        }
    }

    record.lock().phase_index = total;
    finish(
        &services, &handle, &record, &ctx, spec.as_mut(),
        WorkflowStatus::Completed, None, started_at_ms,
    )
    .await;
}

/// Park the workflow until resume or cancellation. Returns false when the
/// wait ended in cancellation.
async fn hold_paused(
    services: &Arc<Services>,
    handle: &Arc<WorkflowHandle>,
    record: &Arc<Mutex<WorkflowRecord>>,
    ctx: &PhaseContext,
    spec: &dyn WorkflowSpec,
    cause: PauseCause,
) -> bool {
    // Uniform pause policy: occupancy and non-benched agents go back to the
    // coordinator so it can reassign them while we sleep.
    ctx.release_for_pause();
    save_partial(record, ctx);

    let status = match cause {
        PauseCause::User => WorkflowStatus::Paused,
        PauseCause::Conflict => WorkflowStatus::Blocked,
    };
    transition(services, handle, record, ctx, spec, status, None);
    ctx.log(&format!("workflow paused ({status})"));

    loop {
        if handle.is_cancelled() {
            return false;
        }
        if handle.pause_requested().is_none() {
            break;
        }
        let cancel_token = handle.cancel_token();
        tokio::select! {
            _ = handle.wait_resume() => {}
            _ = cancel_token.cancelled() => return false,
        }
    }

    handle.refresh_interrupt();

    // Re-acquire what the pause released before re-entering the phase
    if !ctx.try_reacquire() {
        transition(services, handle, record, ctx, spec, WorkflowStatus::Blocked, None);
        ctx.log("waiting to re-acquire task occupancy");
        if ctx.reacquire_occupancy().await.is_err() {
            return false;
        }
    }

    transition(services, handle, record, ctx, spec, WorkflowStatus::Running, None);
    ctx.log("workflow resumed");
    true
}

/// Terminal bookkeeping: status, cleanup, persistence, completion event.
async fn finish(
    services: &Arc<Services>,
    handle: &Arc<WorkflowHandle>,
    record: &Arc<Mutex<WorkflowRecord>>,
    ctx: &PhaseContext,
    spec: &mut dyn WorkflowSpec,
    status: WorkflowStatus,
    error: Option<String>,
    started_at_ms: u64,
) {
    match status {
        WorkflowStatus::Failed => spec.on_failure(ctx).await,
        WorkflowStatus::Cancelled => spec.on_cancel(ctx).await,
        _ => {}
    }

    // Terminal cleanup empties the allocated-agent set, occupancy, conflicts
    services.pool.release_workflow(handle.id, true);
    services.occupancy.release(handle.id, None);
    services.conflicts.clear(handle.id);

    {
        let mut record = record.lock();
        record.error = error.clone();
        record.files_modified = ctx.files_modified();
    }
    transition(services, handle, record, ctx, &*spec, status, error.clone());
    ctx.log(&format!("workflow finished: {status}"));

    let duration_ms = services.now_ms().saturating_sub(started_at_ms);
    services.events.fire(&Event::WorkflowCompleted {
        id: handle.id,
        session_id: handle.session_id,
        success: status == WorkflowStatus::Completed,
        error,
        duration_ms,
        output: spec.output(),
    });
    services.nudge();
}

fn transition(
    services: &Arc<Services>,
    handle: &Arc<WorkflowHandle>,
    record: &Arc<Mutex<WorkflowRecord>>,
    ctx: &PhaseContext,
    spec: &dyn WorkflowSpec,
    status: WorkflowStatus,
    error: Option<String>,
) {
    handle.set_status(status);
    {
        let mut record = record.lock();
        record.status = status;
        if error.is_some() {
            record.error = error;
        }
    }
    save(services, record);
    let message = format!("status: {status}");
    emit_progress(services, handle, record, ctx, spec, message);
    services.nudge();
}

fn emit_progress(
    services: &Arc<Services>,
    handle: &Arc<WorkflowHandle>,
    record: &Arc<Mutex<WorkflowRecord>>,
    ctx: &PhaseContext,
    spec: &dyn WorkflowSpec,
    message: String,
) {
    let (status, phase_index, phase_name, task_id) = {
        let record = record.lock();
        (record.status, record.phase_index, record.phase_name.clone(), task_of(&record))
    };
    let total = spec.phases().len();
    let progress = WorkflowProgress {
        workflow_id: handle.id,
        kind: spec.kind().to_string(),
        status,
        phase: phase_name,
        phase_index,
        total_phases: total,
        percentage: WorkflowProgress::percent(phase_index, total),
        message,
        task_id,
        log_path: ctx.logger.path().to_path_buf(),
    };
    services.events.fire(&Event::WorkflowProgressed { progress });
}

fn task_of(record: &WorkflowRecord) -> Option<apc_core::TaskId> {
    record
        .input
        .get("task_id")
        .and_then(|v| v.as_str())
        .map(apc_core::TaskId::from_string)
}

fn save_partial(record: &Arc<Mutex<WorkflowRecord>>, ctx: &PhaseContext) {
    if let Some(context) = ctx.take_partial_output() {
        if let Ok(json) = serde_json::to_string(&context) {
            record.lock().partial_output = Some(json);
        }
    }
}

fn save(services: &Arc<Services>, record: &Arc<Mutex<WorkflowRecord>>) {
    let snapshot = {
        let mut record = record.lock();
        record.updated_at_ms = services.now_ms();
        record.clone()
    };
    if let Err(e) = services.persist.save_workflow(&snapshot) {
        tracing::error!(workflow = %snapshot.id, error = %e, "workflow state write failed");
        services.events.fire(&Event::Error {
            message: format!("persistence failure: {e}"),
            workflow_id: Some(snapshot.id),
        });
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{harness, harness_with, workflow_fixture, TestHarness};
use crate::workflow::WorkflowError;
use apc_core::{OccupancyMode, SessionId, SignalResult, Stage, TaskId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

fn sid() -> SessionId {
    SessionId::from_string("sruntime001")
}

/// Scripted phase behavior for exercising the runtime in isolation.
enum Step {
    Advance,
    RewindOnce { to: usize },
    FailTransient { times: u32 },
    FailPermanent,
    RunAgent { stage: Stage },
    HoldOccupancy { task: &'static str },
}

struct ScriptedSpec {
    phases: &'static [&'static str],
    steps: Vec<Step>,
    rewound: bool,
    transient_left: u32,
}

impl ScriptedSpec {
    fn new(phases: &'static [&'static str], steps: Vec<Step>) -> Box<Self> {
        Box::new(Self { phases, steps, rewound: false, transient_left: 0 })
    }
}

#[async_trait]
impl WorkflowSpec for ScriptedSpec {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn phases(&self) -> &'static [&'static str] {
        self.phases
    }

    async fn execute_phase(
        &mut self,
        index: usize,
        ctx: &PhaseContext,
    ) -> Result<PhaseOutcome, WorkflowError> {
        match &mut self.steps[index] {
            Step::Advance => Ok(PhaseOutcome::Advance),
            Step::RewindOnce { to } => {
                if self.rewound {
                    Ok(PhaseOutcome::Advance)
                } else {
                    self.rewound = true;
                    Ok(PhaseOutcome::Rewind { to: *to })
                }
            }
            Step::FailTransient { times } => {
                if *times > 0 {
                    *times -= 1;
                    Err(WorkflowError::Transient("flaky".to_string()))
                } else {
                    Ok(PhaseOutcome::Advance)
                }
            }
            Step::FailPermanent => Err(WorkflowError::Permanent("broken".to_string())),
            Step::RunAgent { stage } => {
                let signal = ctx
                    .run_agent(
                        "worker",
                        *stage,
                        None,
                        "do the thing".to_string(),
                        crate::workflow::AgentDisposition::Release,
                    )
                    .await?;
                if signal.result == SignalResult::Success {
                    Ok(PhaseOutcome::Advance)
                } else {
                    Err(WorkflowError::Permanent("agent failed".to_string()))
                }
            }
            Step::HoldOccupancy { task } => {
                ctx.declare_occupancy(
                    &[TaskId::from_string(*task)],
                    OccupancyMode::Exclusive,
                    "testing",
                )?;
                Ok(PhaseOutcome::Advance)
            }
        }
    }
}

async fn drive(harness: &TestHarness, spec: Box<dyn WorkflowSpec>) -> apc_core::WorkflowRecord {
    let (handle, record) = workflow_fixture(sid(), spec.kind(), serde_json::Value::Null);
    run_workflow(spec, handle, std::sync::Arc::clone(&harness.services), record.clone()).await;
    let snapshot = record.lock().clone();
    snapshot
}

#[tokio::test]
async fn all_phases_complete() {
    let harness = harness();
    let spec = ScriptedSpec::new(&["a", "b"], vec![Step::Advance, Step::Advance]);
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Completed);
    assert_eq!(record.phase_index, 2);
}

#[tokio::test]
async fn progress_phase_indexes_only_decrease_on_rewind() {
    let harness = harness();
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    let _sub = harness.events.subscribe(move |event| {
        if let apc_core::Event::WorkflowProgressed { progress } = event {
            sink.lock().push((progress.phase_index, progress.message.clone()));
        }
    });

    let spec = ScriptedSpec::new(
        &["a", "b", "c"],
        vec![Step::Advance, Step::RewindOnce { to: 0 }, Step::Advance],
    );
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Completed);

    let seen = seen.lock();
    let mut last = 0usize;
    for (index, message) in seen.iter() {
        if *index < last {
            assert!(
                message.contains("looping back"),
                "decrease without a looping-back record: {message}"
            );
        }
        last = *index;
    }
    assert!(seen.iter().any(|(_, m)| m.contains("looping back")));
}

#[tokio::test]
async fn transient_errors_retry_until_success() {
    let harness = harness();
    let spec = ScriptedSpec::new(&["only"], vec![Step::FailTransient { times: 2 }]);
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Completed);
}

#[tokio::test]
async fn retry_cap_exhaustion_fails_workflow() {
    let harness = harness();
    let completions = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&completions);
    let _sub = harness.events.subscribe(move |event| {
        if let apc_core::Event::WorkflowCompleted { success, .. } = event {
            sink.lock().push(*success);
        }
    });

    // Three attempts allowed, ten failures scripted
    let spec = ScriptedSpec::new(&["only"], vec![Step::FailTransient { times: 10 }]);
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Failed);
    assert_eq!(*completions.lock(), vec![false]);
}

#[tokio::test]
async fn permanent_error_fails_without_retry() {
    let harness = harness();
    let spec = ScriptedSpec::new(&["only"], vec![Step::FailPermanent]);
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("broken"));
}

#[tokio::test]
async fn run_agent_success_advances() {
    let harness = harness();
    let spec = ScriptedSpec::new(&["work"], vec![Step::RunAgent { stage: Stage::Implementation }]);
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Completed);
    assert_eq!(harness.runner.invocations().len(), 1);
    // Agent went back to the pool
    assert_eq!(harness.services.pool.status().busy, 0);
}

#[tokio::test]
async fn agent_exit_without_signal_fails_distinctly() {
    let harness = harness_with(|_| crate::runner::FakeBehavior {
        signal: None,
        ..Default::default()
    });
    let spec = ScriptedSpec::new(&["work"], vec![Step::RunAgent { stage: Stage::Implementation }]);
    let record = drive(&harness, spec).await;
    assert_eq!(record.status, apc_core::WorkflowStatus::Failed);
    assert!(record.error.as_deref().unwrap_or_default().contains("without signalling"));
}

#[tokio::test]
async fn prompt_carries_completion_instructions() {
    let harness = harness();
    let spec = ScriptedSpec::new(&["work"], vec![Step::RunAgent { stage: Stage::Implementation }]);
    drive(&harness, spec).await;
    let invocation = &harness.runner.invocations()[0];
    assert!(invocation.prompt.contains("apc agent complete"));
    assert!(invocation.prompt.contains(invocation.workflow_id.as_str()));
}

#[tokio::test]
async fn cooperative_pause_releases_occupancy_and_resumes() {
    let harness = harness_with(|_| crate::runner::FakeBehavior {
        delay: std::time::Duration::from_millis(80),
        ..Default::default()
    });
    let spec = ScriptedSpec::new(
        &["occupy", "work", "rest"],
        vec![
            Step::HoldOccupancy { task: "sruntime001_T1" },
            Step::RunAgent { stage: Stage::Implementation },
            Step::Advance,
        ],
    );
    let (handle, record) = workflow_fixture(sid(), "scripted", serde_json::Value::Null);
    let run = tokio::spawn(run_workflow(
        spec,
        std::sync::Arc::clone(&handle),
        std::sync::Arc::clone(&harness.services),
        std::sync::Arc::clone(&record),
    ));

    // Pause while the agent phase is in flight (cooperative: phase finishes)
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    handle.request_pause(PauseCause::User, false);
    let mut watch = handle.status_watch();
    while *watch.borrow_and_update() != apc_core::WorkflowStatus::Paused {
        watch.changed().await.unwrap();
    }
    assert!(harness
        .services
        .occupancy
        .tasks_occupied_by(handle.id)
        .is_empty());

    handle.resume();
    run.await.unwrap();
    assert_eq!(record.lock().status, apc_core::WorkflowStatus::Completed);
}

#[tokio::test]
async fn forced_pause_captures_continuation_for_next_prompt() {
    let calls = std::sync::Arc::new(AtomicU32::new(0));
    let counter = std::sync::Arc::clone(&calls);
    let harness = harness_with(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            crate::runner::FakeBehavior {
                // Never signals within the test window; will be killed
                delay: std::time::Duration::from_secs(30),
                output: "finished writing src/half_done.rs\n".to_string(),
                ..Default::default()
            }
        } else {
            crate::runner::FakeBehavior::default()
        }
    });

    let spec = ScriptedSpec::new(&["work"], vec![Step::RunAgent { stage: Stage::Implementation }]);
    let (handle, record) = workflow_fixture(sid(), "scripted", serde_json::Value::Null);
    let run = tokio::spawn(run_workflow(
        spec,
        std::sync::Arc::clone(&handle),
        std::sync::Arc::clone(&harness.services),
        std::sync::Arc::clone(&record),
    ));

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    handle.request_pause(PauseCause::Conflict, true);
    let mut watch = handle.status_watch();
    while *watch.borrow_and_update() != apc_core::WorkflowStatus::Blocked {
        watch.changed().await.unwrap();
    }
    // Partial progress persisted with the paused record
    assert!(record.lock().partial_output.is_some());

    handle.resume();
    run.await.unwrap();
    assert_eq!(record.lock().status, apc_core::WorkflowStatus::Completed);

    let invocations = harness.runner.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[1].prompt.contains("src/half_done.rs"));
    assert!(invocations[1].prompt.contains("interrupted"));
}

#[tokio::test]
async fn cancel_terminates_and_releases_agents() {
    let harness = harness_with(|_| crate::runner::FakeBehavior {
        delay: std::time::Duration::from_secs(30),
        ..Default::default()
    });
    let spec = ScriptedSpec::new(&["work"], vec![Step::RunAgent { stage: Stage::Implementation }]);
    let (handle, record) = workflow_fixture(sid(), "scripted", serde_json::Value::Null);
    let run = tokio::spawn(run_workflow(
        spec,
        std::sync::Arc::clone(&handle),
        std::sync::Arc::clone(&harness.services),
        std::sync::Arc::clone(&record),
    ));

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    handle.cancel();
    run.await.unwrap();

    assert_eq!(record.lock().status, apc_core::WorkflowStatus::Cancelled);
    assert_eq!(harness.services.pool.status().busy, 0);
}

#[tokio::test]
async fn pause_then_resume_without_events_is_a_noop_on_progress() {
    let harness = harness();
    let spec = ScriptedSpec::new(&["a", "b"], vec![Step::Advance, Step::Advance]);
    let (handle, record) = workflow_fixture(sid(), "scripted", serde_json::Value::Null);

    // Pause before the runtime starts: it parks immediately
    handle.request_pause(PauseCause::User, false);
    let run = tokio::spawn(run_workflow(
        spec,
        std::sync::Arc::clone(&handle),
        std::sync::Arc::clone(&harness.services),
        std::sync::Arc::clone(&record),
    ));
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let index_before = record.lock().phase_index;

    handle.resume();
    run.await.unwrap();
    assert_eq!(index_before, 0);
    assert_eq!(record.lock().status, apc_core::WorkflowStatus::Completed);
}

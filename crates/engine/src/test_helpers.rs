// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use std::sync::Arc;
use std::time::Duration;

use apc_core::{FakeClock, Priority, SessionId, WorkflowId, WorkflowRecord, WorkflowStatus};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::event_bus::EventBus;
use crate::occupancy::{ConflictTable, OccupancyTable};
use crate::persist::Persistence;
use crate::pool::AgentPool;
use crate::runner::{AgentInvocation, FakeBehavior, FakeRunner};
use crate::services::{EngineConfig, Services, SharedClock};
use crate::signal_bus::{SignalBus, SignalBusConfig};
use crate::tasks::TaskRegistry;
use crate::workflow::retry::RetryPolicy;
use crate::workflow::WorkflowHandle;

pub struct TestHarness {
    pub services: Arc<Services>,
    pub clock: FakeClock,
    pub runner: Arc<FakeRunner>,
    pub events: EventBus,
    _dir: tempfile::TempDir,
}

pub fn test_config(state_dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        state_dir: state_dir.to_path_buf(),
        project_root: state_dir.to_path_buf(),
        work_dir: state_dir.to_path_buf(),
        pool_size: 4,
        signal_timeout: Duration::from_secs(2),
        signal_grace: Duration::from_millis(50),
        retry: RetryPolicy::immediate(3),
        planning_iteration_cap: 3,
        review_loop_cap: 3,
        signal_bus: SignalBusConfig::default(),
    }
}

/// Build a full service stack around a scripted [`FakeRunner`].
pub fn harness_with(
    behavior: impl Fn(&AgentInvocation) -> FakeBehavior + Send + Sync + 'static,
) -> TestHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());
    harness_in(dir, config, behavior)
}

pub fn harness_in(
    dir: tempfile::TempDir,
    config: EngineConfig,
    behavior: impl Fn(&AgentInvocation) -> FakeBehavior + Send + Sync + 'static,
) -> TestHarness {
    let clock = FakeClock::new();
    let shared_clock = SharedClock::new(clock.clone());
    let events = EventBus::new();
    let persist = Persistence::new(&config.state_dir);
    let pool = AgentPool::new(config.pool_size, events.clone()).expect("pool");
    let signals = SignalBus::new(config.signal_bus, shared_clock.clone(), events.clone());
    let runner = Arc::new(
        FakeRunner::new(signals.clone(), shared_clock.clone()).with_behavior(behavior),
    );
    let services = Arc::new(Services {
        config,
        clock: shared_clock,
        events: events.clone(),
        pool,
        tasks: TaskRegistry::new(events.clone()),
        occupancy: OccupancyTable::new(events.clone()),
        conflicts: ConflictTable::new(events.clone()),
        signals,
        runner: Arc::clone(&runner) as Arc<dyn crate::runner::AgentRunner>,
        persist,
        reconcile: Notify::new(),
    });
    TestHarness { services, clock, runner, events, _dir: dir }
}

pub fn harness() -> TestHarness {
    harness_with(|_| FakeBehavior::default())
}

/// Handle + shared record pair for driving `run_workflow` directly.
pub fn workflow_fixture(
    session: SessionId,
    kind: &str,
    input: serde_json::Value,
) -> (Arc<WorkflowHandle>, Arc<Mutex<WorkflowRecord>>) {
    let id = WorkflowId::new();
    let handle = Arc::new(WorkflowHandle::new(id, session, kind, Priority::NORMAL, false));
    let record = WorkflowRecord {
        id,
        kind: kind.to_string(),
        session_id: session,
        status: WorkflowStatus::Pending,
        priority: Priority::NORMAL,
        phase_index: 0,
        phase_name: String::new(),
        input,
        partial_output: None,
        files_modified: Vec::new(),
        error: None,
        updated_at_ms: 0,
    };
    (handle, Arc::new(Mutex::new(record)))
}

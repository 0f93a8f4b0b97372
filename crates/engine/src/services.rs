// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injected service bundle handed to workflows.
//!
//! Workflows never mutate shared state directly; they go through the
//! components collected here, and every mutation that can affect admission
//! or conflicts nudges the coordinator's reconciliation pass.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use apc_core::Clock;
use tokio::sync::Notify;

use crate::event_bus::EventBus;
use crate::occupancy::{ConflictTable, OccupancyTable};
use crate::persist::Persistence;
use crate::pool::AgentPool;
use crate::runner::AgentRunner;
use crate::signal_bus::{SignalBus, SignalBusConfig};
use crate::tasks::TaskRegistry;
use crate::workflow::retry::RetryPolicy;

/// Object-safe clock wrapper so the engine stays non-generic while tests can
/// still inject an `apc_core::FakeClock`.
#[derive(Clone)]
pub struct SharedClock(Arc<dyn DynClock + Send + Sync>);

trait DynClock {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

impl<C: Clock> DynClock for C {
    fn now(&self) -> Instant {
        Clock::now(self)
    }

    fn epoch_ms(&self) -> u64 {
        Clock::epoch_ms(self)
    }
}

impl SharedClock {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self(Arc::new(clock))
    }

    pub fn system() -> Self {
        Self::new(apc_core::SystemClock)
    }
}

impl Clock for SharedClock {
    fn now(&self) -> Instant {
        self.0.now()
    }

    fn epoch_ms(&self) -> u64 {
        self.0.epoch_ms()
    }
}

/// Engine-wide tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub state_dir: PathBuf,
    /// Project root the coordinator serves (keys the pool state file)
    pub project_root: PathBuf,
    /// Directory agents execute in
    pub work_dir: PathBuf,
    pub pool_size: usize,
    /// Base timeout for one completion-signal wait
    pub signal_timeout: Duration,
    /// Grace window for a late CLI callback after the subprocess exited
    pub signal_grace: Duration,
    pub retry: RetryPolicy,
    /// Planner/analyst iteration cap for planning workflows
    pub planning_iteration_cap: u32,
    /// Review loop cap for implementation workflows
    pub review_loop_cap: u32,
    pub signal_bus: SignalBusConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".apc"),
            project_root: PathBuf::from("."),
            work_dir: PathBuf::from("."),
            pool_size: 4,
            signal_timeout: Duration::from_secs(600),
            signal_grace: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            planning_iteration_cap: 3,
            review_loop_cap: 3,
            signal_bus: SignalBusConfig::default(),
        }
    }
}

/// Shared components owned by the coordinator, injected into workflows.
pub struct Services {
    pub config: EngineConfig,
    pub clock: SharedClock,
    pub events: EventBus,
    pub pool: AgentPool,
    pub tasks: TaskRegistry,
    pub occupancy: OccupancyTable,
    pub conflicts: ConflictTable,
    pub signals: SignalBus,
    pub runner: Arc<dyn AgentRunner>,
    pub persist: Persistence,
    /// Nudges the coordinator's reconciliation loop
    pub reconcile: Notify,
}

impl Services {
    pub fn new(
        config: EngineConfig,
        clock: SharedClock,
        runner: Arc<dyn AgentRunner>,
    ) -> Result<Arc<Self>, crate::pool::PoolError> {
        let events = EventBus::new();
        let persist = Persistence::new(&config.state_dir);
        let pool_size = persist
            .load_pool_size(&config.project_root)
            .unwrap_or(config.pool_size);
        let pool = AgentPool::new(pool_size, events.clone())?;
        let signals = SignalBus::new(config.signal_bus, clock.clone(), events.clone());
        let tasks = TaskRegistry::new(events.clone());
        let occupancy = OccupancyTable::new(events.clone());
        let conflicts = ConflictTable::new(events.clone());
        Ok(Arc::new(Self {
            config,
            clock,
            events,
            pool,
            tasks,
            occupancy,
            conflicts,
            signals,
            runner,
            persist,
            reconcile: Notify::new(),
        }))
    }

    pub fn now_ms(&self) -> u64 {
        Clock::epoch_ms(&self.clock)
    }

    /// Wake the reconciliation loop.
    pub fn nudge(&self) {
        self.reconcile.notify_one();
    }
}

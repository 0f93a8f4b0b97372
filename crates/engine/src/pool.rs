// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent pool: a fixed roster of named agent slots shared across workflows.
//!
//! Requests block until an agent frees (lowest priority number first, FIFO
//! within a priority), or fail fast via [`AgentPool::try_request`]. Shrinking
//! marks surplus agents as retiring: they cannot be allocated and leave the
//! roster when next released.

use std::collections::BTreeSet;
use std::sync::Arc;

use apc_core::{AgentState, Event, Priority, RoleId, WorkflowId, AGENT_ROSTER, MAX_POOL_SIZE};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Errors from pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no agent available")]
    PoolExhausted,
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("agent {0} is not allocated")]
    NotAllocated(String),
    #[error("invalid pool size {0}, must be 1..={max}", max = MAX_POOL_SIZE)]
    InvalidSize(usize),
    #[error("allocation cancelled")]
    Cancelled,
}

/// Counts reported by [`AgentPool::status`].
///
/// Benched agents count as busy: they are owned by a workflow even though no
/// prompt is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
}

struct Slot {
    name: &'static str,
    state: AgentState,
    workflow: Option<WorkflowId>,
    role: Option<RoleId>,
}

struct Waiter {
    priority: Priority,
    seq: u64,
    workflow: WorkflowId,
    role: RoleId,
    tx: oneshot::Sender<String>,
}

struct PoolInner {
    slots: Vec<Slot>,
    retiring: BTreeSet<&'static str>,
    waiters: Vec<Waiter>,
    next_seq: u64,
}

impl PoolInner {
    /// Pick an allocatable slot for `workflow`: a benched agent already owned
    /// by this workflow with the right role is preferred over a fresh one.
    fn pick(&mut self, workflow: WorkflowId, role: &RoleId) -> Option<usize> {
        if let Some(i) = self.slots.iter().position(|s| {
            s.state == AgentState::Benched
                && s.workflow == Some(workflow)
                && s.role.as_ref() == Some(role)
        }) {
            return Some(i);
        }
        self.slots
            .iter()
            .position(|s| s.state == AgentState::Available && !self.retiring.contains(s.name))
    }

    fn allocate(&mut self, i: usize, workflow: WorkflowId, role: RoleId) -> String {
        let slot = &mut self.slots[i];
        slot.state = AgentState::Busy;
        slot.workflow = Some(workflow);
        slot.role = Some(role);
        slot.name.to_string()
    }

    fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Index of the next waiter to serve: lowest priority number, then FIFO.
    fn next_waiter(&self) -> Option<usize> {
        self.waiters
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| (w.priority, w.seq))
            .map(|(i, _)| i)
    }
}

/// The shared agent pool.
#[derive(Clone)]
pub struct AgentPool {
    inner: Arc<Mutex<PoolInner>>,
    events: crate::event_bus::EventBus,
}

impl AgentPool {
    pub fn new(size: usize, events: crate::event_bus::EventBus) -> Result<Self, PoolError> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(PoolError::InvalidSize(size));
        }
        let slots = AGENT_ROSTER[..size]
            .iter()
            .map(|name| Slot { name, state: AgentState::Available, workflow: None, role: None })
            .collect();
        Ok(Self {
            inner: Arc::new(Mutex::new(PoolInner {
                slots,
                retiring: BTreeSet::new(),
                waiters: Vec::new(),
                next_seq: 0,
            })),
            events,
        })
    }

    /// Allocate an agent, waiting until one frees.
    ///
    /// Waiters are served in (priority, FIFO) order. Cancelling the token
    /// abandons the wait.
    pub async fn request(
        &self,
        workflow: WorkflowId,
        role: RoleId,
        priority: Priority,
        cancel: &CancellationToken,
    ) -> Result<String, PoolError> {
        let (seq, rx) = {
            let mut inner = self.inner.lock();
            if let Some(i) = inner.pick(workflow, &role) {
                let name = inner.allocate(i, workflow, role.clone());
                drop(inner);
                self.fire_allocated(&name, workflow, &role);
                return Ok(name);
            }
            let (tx, rx) = oneshot::channel();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.waiters.push(Waiter { priority, seq, workflow, role: role.clone(), tx });
            (seq, rx)
        };

        tokio::select! {
            name = rx => match name {
                Ok(name) => {
                    self.fire_allocated(&name, workflow, &role);
                    Ok(name)
                }
                // Sender dropped: pool shut down mid-wait
                Err(_) => Err(PoolError::Cancelled),
            },
            _ = cancel.cancelled() => {
                self.inner.lock().waiters.retain(|w| w.seq != seq);
                Err(PoolError::Cancelled)
            }
        }
    }

    /// Allocate without waiting; fails with [`PoolError::PoolExhausted`].
    pub fn try_request(&self, workflow: WorkflowId, role: RoleId) -> Result<String, PoolError> {
        let name = {
            let mut inner = self.inner.lock();
            let i = inner.pick(workflow, &role).ok_or(PoolError::PoolExhausted)?;
            inner.allocate(i, workflow, role.clone())
        };
        self.fire_allocated(&name, workflow, &role);
        Ok(name)
    }

    /// Return an agent to the pool (or retire it if the pool shrank).
    pub fn release(&self, name: &str) -> Result<(), PoolError> {
        let (workflow, handoff) = {
            let mut inner = self.inner.lock();
            let i = inner.slot_index(name).ok_or_else(|| PoolError::UnknownAgent(name.into()))?;
            if inner.slots[i].state == AgentState::Available {
                return Err(PoolError::NotAllocated(name.into()));
            }
            let workflow = inner.slots[i].workflow.take();
            inner.slots[i].state = AgentState::Available;
            inner.slots[i].role = None;

            if inner.retiring.remove(name) {
                inner.slots.remove(i);
                (workflow, None)
            } else {
                (workflow, self.serve_next_waiter(&mut inner, i))
            }
        };
        if let Some(workflow) = workflow {
            self.events.fire(&Event::AgentReleased { agent: name.to_string(), workflow_id: workflow });
        }
        if let Some((agent, workflow, role)) = handoff {
            self.fire_allocated(&agent, workflow, &role);
        }
        Ok(())
    }

    /// Hand the freed slot `i` to the best waiter, skipping abandoned ones.
    fn serve_next_waiter(
        &self,
        inner: &mut PoolInner,
        i: usize,
    ) -> Option<(String, WorkflowId, RoleId)> {
        while let Some(w) = inner.next_waiter() {
            let waiter = inner.waiters.remove(w);
            let name = inner.allocate(i, waiter.workflow, waiter.role.clone());
            match waiter.tx.send(name.clone()) {
                Ok(()) => return Some((name, waiter.workflow, waiter.role)),
                Err(_) => {
                    // Receiver dropped (cancelled); undo and try the next waiter
                    inner.slots[i].state = AgentState::Available;
                    inner.slots[i].workflow = None;
                    inner.slots[i].role = None;
                }
            }
        }
        None
    }

    /// Park an allocated agent on the bench. It stays owned by its workflow.
    pub fn bench(&self, name: &str) -> Result<(), PoolError> {
        let workflow = {
            let mut inner = self.inner.lock();
            let i = inner.slot_index(name).ok_or_else(|| PoolError::UnknownAgent(name.into()))?;
            if inner.slots[i].state != AgentState::Busy {
                return Err(PoolError::NotAllocated(name.into()));
            }
            inner.slots[i].state = AgentState::Benched;
            inner.slots[i].workflow
        };
        if let Some(workflow) = workflow {
            self.events.fire(&Event::AgentBenched { agent: name.to_string(), workflow_id: workflow });
        }
        Ok(())
    }

    /// Reverse a bench: the agent is busy again.
    pub fn promote(&self, name: &str) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        let i = inner.slot_index(name).ok_or_else(|| PoolError::UnknownAgent(name.into()))?;
        if inner.slots[i].state != AgentState::Benched {
            return Err(PoolError::NotAllocated(name.into()));
        }
        inner.slots[i].state = AgentState::Busy;
        Ok(())
    }

    /// Release every agent a workflow owns; benched ones only when
    /// `include_benched` (terminal cleanup) is set.
    pub fn release_workflow(&self, workflow: WorkflowId, include_benched: bool) -> Vec<String> {
        let names: Vec<String> = {
            let inner = self.inner.lock();
            inner
                .slots
                .iter()
                .filter(|s| {
                    s.workflow == Some(workflow)
                        && (include_benched || s.state == AgentState::Busy)
                })
                .map(|s| s.name.to_string())
                .collect()
        };
        for name in &names {
            if let Err(e) = self.release(name) {
                tracing::warn!(agent = %name, error = %e, "release_workflow failed");
            }
        }
        names
    }

    /// Agents currently owned by a workflow.
    pub fn agents_of(&self, workflow: WorkflowId) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .filter(|s| s.workflow == Some(workflow))
            .map(|s| s.name.to_string())
            .collect()
    }

    pub fn status(&self) -> PoolStatus {
        let inner = self.inner.lock();
        let available = inner
            .slots
            .iter()
            .filter(|s| s.state == AgentState::Available && !inner.retiring.contains(s.name))
            .count();
        PoolStatus {
            total: inner.slots.len(),
            available,
            busy: inner.slots.len() - available,
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Grow or shrink the roster.
    ///
    /// Growing adds names from the fixed roster. Shrinking retires the
    /// highest-indexed agents: available ones leave immediately, allocated
    /// ones when next released.
    pub fn resize(&self, size: usize) -> Result<(), PoolError> {
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(PoolError::InvalidSize(size));
        }
        let handoffs = {
            let mut inner = self.inner.lock();
            let current: BTreeSet<&'static str> = inner.slots.iter().map(|s| s.name).collect();
            let target: BTreeSet<&'static str> = AGENT_ROSTER[..size].iter().copied().collect();

            // Growing: add roster names not present, clear any retiring mark
            let mut handoffs = Vec::new();
            for name in AGENT_ROSTER[..size].iter() {
                if !current.contains(name) {
                    inner.slots.push(Slot {
                        name,
                        state: AgentState::Available,
                        workflow: None,
                        role: None,
                    });
                    let i = inner.slots.len() - 1;
                    if let Some(handoff) = self.serve_next_waiter(&mut inner, i) {
                        handoffs.push(handoff);
                    }
                }
                inner.retiring.remove(name);
            }

            // Shrinking: drop or mark surplus names
            let surplus: Vec<&'static str> = inner
                .slots
                .iter()
                .filter(|s| !target.contains(s.name))
                .map(|s| s.name)
                .collect();
            for name in surplus {
                if let Some(i) = inner.slot_index(name) {
                    if inner.slots[i].state == AgentState::Available {
                        inner.slots.remove(i);
                    } else {
                        inner.retiring.insert(name);
                    }
                }
            }
            handoffs
        };
        for (agent, workflow, role) in handoffs {
            self.fire_allocated(&agent, workflow, &role);
        }
        self.events.fire(&Event::PoolResized { size });
        Ok(())
    }

    fn fire_allocated(&self, agent: &str, workflow: WorkflowId, role: &RoleId) {
        self.events.fire(&Event::AgentAllocated {
            agent: agent.to_string(),
            workflow_id: workflow,
            role: role.to_string(),
        });
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

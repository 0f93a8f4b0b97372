// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion-signal bus: joins asynchronous `apc agent complete` CLI
//! callbacks with in-process phase waits.
//!
//! A signal matches an awaiter when (workflow, stage, task) are equal; the
//! carried session id is verified separately and a mismatch is rejected
//! before any state changes. Early signals are retained for a short TTL so
//! the race between subprocess exit and callback delivery is harmless;
//! duplicates after a delivery are discarded with a warning.
//!
//! Delivery fills a shared slot rather than a oneshot: if the awaiting
//! future was dropped mid-race (its select lost to subprocess exit), the
//! signal stays in the slot and a follow-up wait on the same key recovers it
//! instead of reporting a missed callback.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apc_core::{
    Clock, CompletionSignal, Event, SessionId, SignalKey, SignalResult, Stage, TaskId, WorkflowId,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

use crate::event_bus::EventBus;
use crate::services::SharedClock;

/// Errors from signal-bus operations.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("timed out waiting for signal {key}")]
    AwaitTimeout { key: String },
    #[error("an awaiter is already pending for {key}")]
    DuplicateAwaiter { key: String },
    #[error("wait for {key} was cancelled")]
    Cancelled { key: String },
    #[error("signal for {key} carries session {got}, awaiter expects {expected}")]
    SessionMismatch {
        key: String,
        expected: SessionId,
        got: SessionId,
    },
    #[error("result {result} is not valid for stage {stage}")]
    InvalidResult { stage: Stage, result: SignalResult },
}

/// What happened to a delivered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// An awaiter consumed it
    Consumed,
    /// No awaiter yet; retained until the TTL
    Retained,
    /// Duplicate of an already-delivered or already-retained signal
    Discarded,
}

/// Retention tuning.
#[derive(Debug, Clone, Copy)]
pub struct SignalBusConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for SignalBusConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(30), capacity: 32 }
    }
}

/// Rendezvous cell shared between one awaiter and the bus.
#[derive(Default)]
struct SignalSlot {
    value: Mutex<Option<CompletionSignal>>,
    cancelled: AtomicBool,
    notify: Notify,
}

struct PendingWait {
    session: SessionId,
    slot: Arc<SignalSlot>,
}

struct Retained {
    expires_at_ms: u64,
    signal: CompletionSignal,
}

#[derive(Default)]
struct BusState {
    waiters: HashMap<SignalKey, PendingWait>,
    retained: VecDeque<Retained>,
    /// Recently delivered keys (value kept until taken, entry until expiry)
    delivered: HashMap<SignalKey, (u64, Arc<SignalSlot>)>,
}

impl BusState {
    /// Drop expired retained signals and delivery markers. Returns the keys
    /// that expired without an awaiter, for reporting outside the lock.
    fn purge_expired(&mut self, now_ms: u64) -> Vec<SignalKey> {
        let mut expired = Vec::new();
        while let Some(front) = self.retained.front() {
            if front.expires_at_ms > now_ms {
                break;
            }
            if let Some(gone) = self.retained.pop_front() {
                expired.push(gone.signal.key());
            }
        }
        self.delivered.retain(|_, (expires, _)| *expires > now_ms);
        expired
    }
}

/// The completion-signal rendezvous.
#[derive(Clone)]
pub struct SignalBus {
    state: Arc<Mutex<BusState>>,
    config: SignalBusConfig,
    clock: SharedClock,
    events: EventBus,
}

enum WaitStart {
    Ready(CompletionSignal),
    Registered(Arc<SignalSlot>),
    BadSession { expected: SessionId, got: SessionId },
    Duplicate,
}

impl SignalBus {
    pub fn new(config: SignalBusConfig, clock: SharedClock, events: EventBus) -> Self {
        Self { state: Arc::new(Mutex::new(BusState::default())), config, clock, events }
    }

    /// Suspend until a matching signal arrives or `timeout` elapses.
    ///
    /// At most one awaiter per key; a second concurrent wait on the same key
    /// fails with [`SignalError::DuplicateAwaiter`].
    pub async fn wait(
        &self,
        session: SessionId,
        workflow: WorkflowId,
        stage: Stage,
        task: Option<TaskId>,
        timeout: Duration,
    ) -> Result<CompletionSignal, SignalError> {
        let key = SignalKey { workflow_id: workflow, stage, task_id: task };
        let now_ms = self.clock.epoch_ms();
        let ttl_ms = self.config.ttl.as_millis() as u64;

        let (start, expired) = {
            let mut state = self.state.lock();
            let expired = state.purge_expired(now_ms);
            let start = self.begin_wait(&mut state, key, session, now_ms, ttl_ms);
            (start, expired)
        };
        self.report_expired(expired);

        let slot = match start {
            WaitStart::Ready(signal) => return Ok(signal),
            WaitStart::Duplicate => {
                return Err(SignalError::DuplicateAwaiter { key: key.to_string() })
            }
            WaitStart::BadSession { expected, got } => {
                self.reject_session(&key, expected, got);
                return Err(SignalError::SessionMismatch { key: key.to_string(), expected, got });
            }
            WaitStart::Registered(slot) => slot,
        };

        let receive = async {
            loop {
                if let Some(signal) = slot.value.lock().take() {
                    return Ok(signal);
                }
                if slot.cancelled.load(Ordering::SeqCst) {
                    return Err(SignalError::Cancelled { key: key.to_string() });
                }
                slot.notify.notified().await;
            }
        };
        match tokio::time::timeout(timeout, receive).await {
            Ok(result) => result,
            Err(_) => {
                self.state.lock().waiters.remove(&key);
                Err(SignalError::AwaitTimeout { key: key.to_string() })
            }
        }
    }

    fn begin_wait(
        &self,
        state: &mut BusState,
        key: SignalKey,
        session: SessionId,
        now_ms: u64,
        ttl_ms: u64,
    ) -> WaitStart {
        // Late binding: an early signal may be retained for us
        if let Some(i) = state.retained.iter().position(|r| r.signal.key() == key) {
            if let Some(retained) = state.retained.remove(i) {
                if retained.signal.session_id != session {
                    return WaitStart::BadSession {
                        expected: session,
                        got: retained.signal.session_id,
                    };
                }
                let slot = Arc::new(SignalSlot::default());
                state.delivered.insert(key, (now_ms + ttl_ms, slot));
                return WaitStart::Ready(retained.signal);
            }
        }

        // A delivered-but-unread signal (the previous wait future was
        // dropped mid-race) is recoverable
        if let Some((_, slot)) = state.delivered.get(&key) {
            let mut value = slot.value.lock();
            if let Some(signal) = value.take() {
                if signal.session_id == session {
                    return WaitStart::Ready(signal);
                }
                let got = signal.session_id;
                *value = Some(signal);
                return WaitStart::BadSession { expected: session, got };
            }
        }

        if state.waiters.contains_key(&key) {
            return WaitStart::Duplicate;
        }

        // A fresh awaiter declares intent for the NEXT signal on this key;
        // the duplicate marker from the previous delivery no longer applies.
        state.delivered.remove(&key);
        let slot = Arc::new(SignalSlot::default());
        state.waiters.insert(key, PendingWait { session, slot: Arc::clone(&slot) });
        WaitStart::Registered(slot)
    }

    /// Deliver a signal from the outside world.
    ///
    /// Wakes the matching awaiter if one exists; otherwise retains the signal
    /// briefly. Invalid result codes and session mismatches are rejected
    /// before any mutation and surfaced as `error` events.
    pub fn deliver(&self, mut signal: CompletionSignal) -> Result<Delivery, SignalError> {
        if !signal.result.valid_for(signal.stage) {
            self.events.fire(&Event::Error {
                message: format!("result {} not valid for stage {}", signal.result, signal.stage),
                workflow_id: Some(signal.workflow_id),
            });
            return Err(SignalError::InvalidResult { stage: signal.stage, result: signal.result });
        }

        let key = signal.key();
        let now_ms = self.clock.epoch_ms();
        let ttl_ms = self.config.ttl.as_millis() as u64;
        signal.received_at_ms = now_ms;

        enum Outcome {
            Done(Delivery),
            Mismatch { expected: SessionId, got: SessionId },
            Duplicate,
        }

        let (outcome, expired) = {
            let mut state = self.state.lock();
            let expired = state.purge_expired(now_ms);

            let outcome = if let Some(waiter) = state.waiters.remove(&key) {
                if waiter.session != signal.session_id {
                    let expected = waiter.session;
                    let got = signal.session_id;
                    state.waiters.insert(key, waiter);
                    Outcome::Mismatch { expected, got }
                } else {
                    *waiter.slot.value.lock() = Some(signal);
                    waiter.slot.notify.notify_one();
                    state.delivered.insert(key, (now_ms + ttl_ms, waiter.slot));
                    Outcome::Done(Delivery::Consumed)
                }
            } else if state.delivered.contains_key(&key)
                || state.retained.iter().any(|r| r.signal.key() == key)
            {
                Outcome::Duplicate
            } else {
                Outcome::Done(self.retain(&mut state, signal, now_ms))
            };
            (outcome, expired)
        };
        self.report_expired(expired);

        match outcome {
            Outcome::Done(delivery) => Ok(delivery),
            Outcome::Duplicate => {
                tracing::warn!(key = %key, "duplicate completion signal discarded");
                self.events.fire(&Event::SignalDiscarded {
                    workflow_id: key.workflow_id,
                    stage: key.stage,
                    reason: "duplicate delivery".to_string(),
                });
                Ok(Delivery::Discarded)
            }
            Outcome::Mismatch { expected, got } => {
                self.reject_session(&key, expected, got);
                Err(SignalError::SessionMismatch { key: key.to_string(), expected, got })
            }
        }
    }

    /// Invalidate an outstanding awaiter (e.g. the subprocess exited and no
    /// signal will ever come). Returns true if one was pending.
    pub fn cancel_pending(&self, workflow: WorkflowId, stage: Stage, task: Option<TaskId>) -> bool {
        let key = SignalKey { workflow_id: workflow, stage, task_id: task };
        match self.state.lock().waiters.remove(&key) {
            Some(waiter) => {
                waiter.slot.cancelled.store(true, Ordering::SeqCst);
                waiter.slot.notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// Number of signals currently in the retention buffer.
    pub fn retained_count(&self) -> usize {
        self.state.lock().retained.len()
    }

    fn retain(&self, state: &mut BusState, signal: CompletionSignal, now_ms: u64) -> Delivery {
        if state.retained.len() >= self.config.capacity {
            if let Some(evicted) = state.retained.pop_front() {
                tracing::warn!(
                    key = %evicted.signal.key(),
                    "retention buffer full, evicting oldest signal"
                );
            }
        }
        state.retained.push_back(Retained {
            expires_at_ms: now_ms + self.config.ttl.as_millis() as u64,
            signal,
        });
        Delivery::Retained
    }

    fn report_expired(&self, expired: Vec<SignalKey>) {
        for key in expired {
            tracing::warn!(key = %key, "retained signal expired without an awaiter");
            self.events.fire(&Event::SignalDiscarded {
                workflow_id: key.workflow_id,
                stage: key.stage,
                reason: "retention ttl expired".to_string(),
            });
        }
    }

    fn reject_session(&self, key: &SignalKey, expected: SessionId, got: SessionId) {
        tracing::error!(key = %key, %expected, %got, "signal session mismatch");
        self.events.fire(&Event::Error {
            message: format!("signal for {key} carries session {got}, expected {expected}"),
            workflow_id: Some(key.workflow_id),
        });
    }
}

#[cfg(test)]
#[path = "signal_bus_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed fire-and-forget event bus.
//!
//! Dispatch is synchronous, in subscription order. A panicking subscriber is
//! caught and logged so it cannot starve the others. There is no replay:
//! events fired before a subscription are lost.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use apc_core::Event;
use parking_lot::Mutex;

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Publish/subscribe fan-out for coordinator events.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned disposer is idempotent.
    pub fn subscribe(&self, listener: impl Fn(&Event) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            disposed: AtomicBool::new(false),
        }
    }

    /// Invoke all listeners synchronously, in subscription order.
    pub fn fire(&self, event: &Event) {
        // Snapshot outside the lock so listeners may subscribe/dispose.
        let listeners: Vec<Listener> =
            self.inner.lock().listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(event = %event.log_summary(), "event listener panicked");
            }
        }
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Disposer for a single subscription.
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    id: u64,
    disposed: AtomicBool,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;

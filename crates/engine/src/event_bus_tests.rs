// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PlMutex;

fn pool_resized(size: usize) -> Event {
    Event::PoolResized { size }
}

#[test]
fn fires_in_subscription_order() {
    let bus = EventBus::new();
    let seen = Arc::new(PlMutex::new(Vec::new()));

    let a = Arc::clone(&seen);
    let _sub_a = bus.subscribe(move |_| a.lock().push("a"));
    let b = Arc::clone(&seen);
    let _sub_b = bus.subscribe(move |_| b.lock().push("b"));

    bus.fire(&pool_resized(1));
    assert_eq!(*seen.lock(), vec!["a", "b"]);
}

#[test]
fn panicking_listener_does_not_starve_others() {
    let bus = EventBus::new();
    let _boom = bus.subscribe(|_| panic!("listener bug"));
    let seen = Arc::new(PlMutex::new(0));
    let counter = Arc::clone(&seen);
    let _sub = bus.subscribe(move |_| *counter.lock() += 1);

    bus.fire(&pool_resized(2));
    bus.fire(&pool_resized(3));
    assert_eq!(*seen.lock(), 2);
}

#[test]
fn dispose_removes_listener() {
    let bus = EventBus::new();
    let seen = Arc::new(PlMutex::new(0));
    let counter = Arc::clone(&seen);
    let sub = bus.subscribe(move |_| *counter.lock() += 1);

    bus.fire(&pool_resized(1));
    sub.dispose();
    bus.fire(&pool_resized(2));

    assert_eq!(*seen.lock(), 1);
    assert_eq!(bus.listener_count(), 0);
}

#[test]
fn dispose_is_idempotent() {
    let bus = EventBus::new();
    let _keep = bus.subscribe(|_| {});
    let sub = bus.subscribe(|_| {});

    sub.dispose();
    sub.dispose();
    assert_eq!(bus.listener_count(), 1);
}

#[test]
fn events_before_subscription_are_lost() {
    let bus = EventBus::new();
    bus.fire(&pool_resized(1));

    let seen = Arc::new(PlMutex::new(0));
    let counter = Arc::clone(&seen);
    let _sub = bus.subscribe(move |_| *counter.lock() += 1);
    assert_eq!(*seen.lock(), 0);
}

#[test]
fn listener_may_subscribe_during_fire() {
    let bus = EventBus::new();
    let bus2 = bus.clone();
    let _sub = bus.subscribe(move |_| {
        let _nested = bus2.subscribe(|_| {});
    });
    bus.fire(&pool_resized(1));
    assert_eq!(bus.listener_count(), 2);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use apc_core::AGENT_ROSTER;

fn wf(n: u32) -> WorkflowId {
    WorkflowId::from_string(format!("wf--pool{n:04}"))
}

fn pool(size: usize) -> AgentPool {
    AgentPool::new(size, crate::event_bus::EventBus::new()).unwrap()
}

fn role() -> RoleId {
    RoleId::from("implementer")
}

#[test]
fn roster_is_truncated_to_size() {
    let pool = pool(3);
    assert_eq!(pool.status(), PoolStatus { total: 3, available: 3, busy: 0 });
}

#[test]
fn rejects_invalid_sizes() {
    let events = crate::event_bus::EventBus::new();
    assert!(matches!(AgentPool::new(0, events.clone()), Err(PoolError::InvalidSize(0))));
    assert!(matches!(AgentPool::new(99, events), Err(PoolError::InvalidSize(99))));
}

#[tokio::test]
async fn request_allocates_in_roster_order() {
    let pool = pool(2);
    let cancel = CancellationToken::new();
    let a = pool.request(wf(1), role(), Priority::NORMAL, &cancel).await.unwrap();
    let b = pool.request(wf(2), role(), Priority::NORMAL, &cancel).await.unwrap();
    assert_eq!(a, AGENT_ROSTER[0]);
    assert_eq!(b, AGENT_ROSTER[1]);
    assert_eq!(pool.status().available, 0);
}

#[test]
fn try_request_fails_fast_when_exhausted() {
    let pool = pool(1);
    pool.try_request(wf(1), role()).unwrap();
    assert!(matches!(pool.try_request(wf(2), role()), Err(PoolError::PoolExhausted)));
}

#[test]
fn release_unknown_agent_fails() {
    let pool = pool(1);
    assert!(matches!(pool.release("Zeus"), Err(PoolError::UnknownAgent(_))));
}

#[test]
fn release_unallocated_fails() {
    let pool = pool(1);
    assert!(matches!(pool.release(AGENT_ROSTER[0]), Err(PoolError::NotAllocated(_))));
}

#[tokio::test]
async fn waiters_served_by_priority_then_fifo() {
    let pool = pool(1);
    let cancel = CancellationToken::new();
    let held = pool.request(wf(0), role(), Priority::NORMAL, &cancel).await.unwrap();

    let p5_first = tokio::spawn({
        let pool = pool.clone();
        let cancel = cancel.clone();
        async move { pool.request(wf(1), role(), Priority::NORMAL, &cancel).await }
    });
    tokio::task::yield_now().await;
    let p5_second = tokio::spawn({
        let pool = pool.clone();
        let cancel = cancel.clone();
        async move { pool.request(wf(2), role(), Priority::NORMAL, &cancel).await }
    });
    tokio::task::yield_now().await;
    let p1 = tokio::spawn({
        let pool = pool.clone();
        let cancel = cancel.clone();
        async move { pool.request(wf(3), role(), Priority(1), &cancel).await }
    });
    // Let all three enqueue
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    pool.release(&held).unwrap();
    let winner = p1.await.unwrap().unwrap();
    assert_eq!(winner, AGENT_ROSTER[0]);

    pool.release(&winner).unwrap();
    let second = p5_first.await.unwrap().unwrap();
    pool.release(&second).unwrap();
    let third = p5_second.await.unwrap().unwrap();
    assert_eq!(pool.agents_of(wf(2)), vec![third.clone()]);
    assert_eq!(pool.agents_of(wf(1)), Vec::<String>::new());
}

#[tokio::test]
async fn cancelled_waiter_is_skipped() {
    let pool = pool(1);
    let cancel = CancellationToken::new();
    let held = pool.request(wf(0), role(), Priority::NORMAL, &cancel).await.unwrap();

    let doomed_cancel = CancellationToken::new();
    let doomed = tokio::spawn({
        let pool = pool.clone();
        let token = doomed_cancel.clone();
        async move { pool.request(wf(1), role(), Priority(0), &token).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    doomed_cancel.cancel();
    assert!(matches!(doomed.await.unwrap(), Err(PoolError::Cancelled)));

    let patient = tokio::spawn({
        let pool = pool.clone();
        let cancel = cancel.clone();
        async move { pool.request(wf(2), role(), Priority::NORMAL, &cancel).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    pool.release(&held).unwrap();
    assert!(patient.await.unwrap().is_ok());
}

#[tokio::test]
async fn bench_keeps_agent_owned_and_counted_busy() {
    let pool = pool(2);
    let cancel = CancellationToken::new();
    let agent = pool.request(wf(1), role(), Priority::NORMAL, &cancel).await.unwrap();

    pool.bench(&agent).unwrap();
    assert_eq!(pool.status(), PoolStatus { total: 2, available: 1, busy: 1 });
    assert_eq!(pool.agents_of(wf(1)), vec![agent.clone()]);

    pool.promote(&agent).unwrap();
    assert_eq!(pool.status().busy, 1);
}

#[tokio::test]
async fn benched_agent_reused_by_owning_workflow() {
    let pool = pool(2);
    let cancel = CancellationToken::new();
    let agent = pool.request(wf(1), role(), Priority::NORMAL, &cancel).await.unwrap();
    pool.bench(&agent).unwrap();

    let again = pool.request(wf(1), role(), Priority::NORMAL, &cancel).await.unwrap();
    assert_eq!(again, agent);
}

#[tokio::test]
async fn release_workflow_spares_bench_unless_terminal() {
    let pool = pool(3);
    let cancel = CancellationToken::new();
    let busy = pool.request(wf(1), role(), Priority::NORMAL, &cancel).await.unwrap();
    let benched = pool.request(wf(1), RoleId::from("reviewer"), Priority::NORMAL, &cancel).await.unwrap();
    pool.bench(&benched).unwrap();

    let released = pool.release_workflow(wf(1), false);
    assert_eq!(released, vec![busy]);
    assert_eq!(pool.agents_of(wf(1)), vec![benched.clone()]);

    let rest = pool.release_workflow(wf(1), true);
    assert_eq!(rest, vec![benched]);
    assert!(pool.agents_of(wf(1)).is_empty());
}

#[tokio::test]
async fn shrink_retires_allocated_agents_lazily() {
    let pool = pool(2);
    let cancel = CancellationToken::new();
    let first = pool.request(wf(1), role(), Priority::NORMAL, &cancel).await.unwrap();
    let second = pool.request(wf(2), role(), Priority::NORMAL, &cancel).await.unwrap();

    pool.resize(1).unwrap();
    // Allocated surplus agent is still owned, not yet gone
    assert_eq!(pool.size(), 2);

    pool.release(&second).unwrap();
    assert_eq!(pool.size(), 1);

    // Retiring agents are never re-allocated
    pool.release(&first).unwrap();
    let next = pool.try_request(wf(3), role()).unwrap();
    assert_eq!(next, AGENT_ROSTER[0]);
}

#[test]
fn grow_adds_fresh_roster_names() {
    let pool = pool(1);
    pool.resize(3).unwrap();
    assert_eq!(pool.status(), PoolStatus { total: 3, available: 3, busy: 0 });
}

#[tokio::test]
async fn grow_serves_waiting_requests() {
    let pool = pool(1);
    let cancel = CancellationToken::new();
    let _held = pool.request(wf(0), role(), Priority::NORMAL, &cancel).await.unwrap();

    let waiting = tokio::spawn({
        let pool = pool.clone();
        let cancel = cancel.clone();
        async move { pool.request(wf(1), role(), Priority::NORMAL, &cancel).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    pool.resize(2).unwrap();
    assert_eq!(waiting.await.unwrap().unwrap(), AGENT_ROSTER[1]);
}

#[test]
fn pool_size_one_still_makes_progress() {
    let pool = pool(1);
    let a = pool.try_request(wf(1), role()).unwrap();
    pool.release(&a).unwrap();
    let b = pool.try_request(wf(2), role()).unwrap();
    assert_eq!(a, b);
}

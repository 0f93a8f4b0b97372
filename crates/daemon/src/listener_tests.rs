// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use apc_core::{FakeClock, SessionStatus};
use apc_engine::{
    AgentPool, ConflictTable, EngineConfig, EventBus, FakeBehavior, FakeRunner, OccupancyTable,
    Persistence, Services, SharedClock, SignalBus, TaskRegistry, WorkflowRegistry,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    ctx: Arc<ListenCtx>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        state_dir: dir.path().to_path_buf(),
        project_root: dir.path().to_path_buf(),
        work_dir: dir.path().to_path_buf(),
        signal_timeout: Duration::from_secs(2),
        signal_grace: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let clock = SharedClock::new(FakeClock::new());
    let events = EventBus::new();
    let persist = Persistence::new(dir.path());
    let pool = AgentPool::new(config.pool_size, events.clone()).unwrap();
    let signals =
        SignalBus::new(config.signal_bus, clock.clone(), events.clone());
    let runner = Arc::new(FakeRunner::new(signals.clone(), clock.clone()).with_behavior(
        |invocation| {
            let result = match invocation.stage {
                Stage::Review => apc_core::SignalResult::Approved,
                Stage::Analysis => apc_core::SignalResult::Pass,
                Stage::ErrorAnalysis => apc_core::SignalResult::Complete,
                _ => apc_core::SignalResult::Success,
            };
            FakeBehavior {
                signal: Some((result, serde_json::Value::Null)),
                delay: Duration::from_millis(5),
                ..Default::default()
            }
        },
    ));
    let services = Arc::new(Services {
        config,
        clock,
        events: events.clone(),
        pool,
        tasks: TaskRegistry::new(events.clone()),
        occupancy: OccupancyTable::new(events.clone()),
        conflicts: ConflictTable::new(events),
        signals,
        runner,
        persist,
        reconcile: tokio::sync::Notify::new(),
    });
    let coordinator = Coordinator::new(services, WorkflowRegistry::with_builtins());
    coordinator.start();
    Fixture {
        ctx: Arc::new(ListenCtx { coordinator, started_at: Instant::now() }),
        _dir: dir,
    }
}

#[tokio::test]
async fn status_reports_pool_and_counts() {
    let fixture = fixture();
    let response = handle_request(&fixture.ctx, Request::Status);
    match response {
        Response::Status { status } => {
            assert_eq!(status.pool.total, 4);
            assert!(!status.degraded);
            assert_eq!(status.sessions, 0);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn plan_create_then_session_list() {
    let fixture = fixture();
    let created = handle_request(
        &fixture.ctx,
        Request::PlanCreate { requirement: "make tea".to_string() },
    );
    let session = match created {
        Response::PlanCreated { session, .. } => session,
        other => panic!("unexpected response: {other:?}"),
    };

    let listed = handle_request(&fixture.ctx, Request::SessionList);
    match listed {
        Response::Sessions { sessions } => {
            assert_eq!(sessions.len(), 1);
            assert_eq!(sessions[0].id, session);
            assert_eq!(sessions[0].requirement, "make tea");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn domain_errors_map_to_error_response() {
    let fixture = fixture();
    let response = handle_request(
        &fixture.ctx,
        Request::SessionGet { session: apc_core::SessionId::from_string("smissing000") },
    );
    match response {
        Response::Error { message } => assert!(message.contains("unknown session")),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn agent_complete_with_bad_stage_is_rejected() {
    let fixture = fixture();
    let response = handle_request(
        &fixture.ctx,
        Request::AgentComplete {
            session: apc_core::SessionId::from_string("sabc1234567"),
            workflow: apc_core::WorkflowId::from_string("wf--x"),
            stage: "daydreaming".to_string(),
            task: None,
            result: "success".to_string(),
            data: serde_json::Value::Null,
        },
    );
    match response {
        Response::Error { message } => assert!(message.contains("unknown stage")),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn connection_serves_multiple_correlated_requests() {
    let fixture = fixture();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let ctx = Arc::clone(&fixture.ctx);
    tokio::spawn(async move {
        let _ = serve_connection(server_read, server_write, &ctx).await;
    });

    for id in ["a", "b"] {
        write_frame(
            &mut client_write,
            &RequestEnvelope { id: id.to_string(), request: Request::PoolStatus },
        )
        .await
        .unwrap();
        let frame: ServerFrame = read_frame(&mut client_read, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        match frame {
            ServerFrame::Response(envelope) => {
                assert_eq!(envelope.id, id);
                assert!(matches!(envelope.response, Response::Pool { .. }));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn subscribe_streams_session_events() {
    let fixture = fixture();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (mut client_read, mut client_write) = tokio::io::split(client);

    let ctx = Arc::clone(&fixture.ctx);
    tokio::spawn(async move {
        let _ = serve_connection(server_read, server_write, &ctx).await;
    });

    write_frame(
        &mut client_write,
        &RequestEnvelope { id: "sub".to_string(), request: Request::Subscribe },
    )
    .await
    .unwrap();
    let frame: ServerFrame = read_frame(&mut client_read, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert!(matches!(
        frame,
        ServerFrame::Response(ResponseEnvelope { response: Response::Subscribed, .. })
    ));

    // A session lifecycle event reaches the subscriber
    fixture
        .ctx
        .coordinator
        .services()
        .events
        .fire(&Event::SessionUpdated {
            id: apc_core::SessionId::from_string("sabc1234567"),
            status: SessionStatus::Executing,
        });

    let frame: ServerFrame = read_frame(&mut client_read, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    match frame {
        ServerFrame::Event { event: Event::SessionUpdated { status, .. } } => {
            assert_eq!(status, SessionStatus::Executing);
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    // Internal events are not forwarded
    fixture
        .ctx
        .coordinator
        .services()
        .events
        .fire(&Event::PoolResized { size: 3 });
    fixture
        .ctx
        .coordinator
        .services()
        .events
        .fire(&Event::SessionUpdated {
            id: apc_core::SessionId::from_string("sabc1234567"),
            status: SessionStatus::Completed,
        });
    let frame: ServerFrame = read_frame(&mut client_read, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert!(matches!(
        frame,
        ServerFrame::Event { event: Event::SessionUpdated { status: SessionStatus::Completed, .. } }
    ));
}

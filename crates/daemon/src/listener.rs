// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Runs in a spawned task, accepting connections and handling each in its
//! own task so the coordinator is never blocked. A connection serves
//! correlated request/response pairs until the client disconnects, or — after
//! a `subscribe` request — streams events.

use std::sync::Arc;
use std::time::Instant;

use apc_core::{CompletionSignal, Event, SignalResult, Stage};
use apc_engine::{Coordinator, Delivery};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::env::PROTOCOL_VERSION;
use crate::protocol::{
    read_frame, write_frame, PoolStatusDto, ProtocolError, Request, RequestEnvelope, Response,
    ResponseEnvelope, ServerFrame, SessionDetail, SessionSummary, StatusDto,
};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub coordinator: Coordinator,
    pub started_at: Instant,
}

/// Listener accepting Unix-socket connections.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        info!("listener accepting connections");
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = serve_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("accept error: {e}"),
            }
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => debug!("connection timed out"),
        other => error!("connection error: {other}"),
    }
}

/// Serve one connection. Generic over the stream halves so tests can drive
/// it with in-memory pipes.
pub async fn serve_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let envelope: RequestEnvelope = read_frame(&mut reader, None).await?;
        let id = envelope.id.clone();
        debug!(id = %id, "request received");

        if matches!(envelope.request, Request::Subscribe) {
            let frame = ServerFrame::Response(ResponseEnvelope {
                id,
                response: Response::Subscribed,
            });
            write_frame(&mut writer, &frame).await?;
            return stream_events(reader, writer, ctx).await;
        }

        let response = handle_request(ctx, envelope.request);
        let frame = ServerFrame::Response(ResponseEnvelope { id, response });
        write_frame(&mut writer, &frame).await?;
    }
}

/// Forward observable bus events to a subscribed client until it
/// disconnects.
async fn stream_events<R, W>(mut reader: R, mut writer: W, ctx: &ListenCtx) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let subscription = ctx.coordinator.services().events.subscribe(move |event| {
        if observable(event) {
            let _ = tx.send(event.clone());
        }
    });

    let result = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if let Err(e) = write_frame(&mut writer, &ServerFrame::Event { event }).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
            // Any client read activity means disconnect (subscribers only
            // listen); EOF ends the stream.
            read = read_frame::<_, RequestEnvelope>(&mut reader, None) => match read {
                Err(ProtocolError::ConnectionClosed) => break Ok(()),
                Err(e) => break Err(e),
                Ok(_) => {
                    debug!("ignoring request on subscribed connection");
                }
            },
        }
    };
    subscription.dispose();
    result
}

/// Which events stream to IPC subscribers.
fn observable(event: &Event) -> bool {
    matches!(
        event,
        Event::SessionUpdated { .. }
            | Event::WorkflowProgressed { .. }
            | Event::WorkflowCompleted { .. }
            | Event::AgentAllocated { .. }
            | Event::AgentReleased { .. }
            | Event::Error { .. }
    )
}

/// Dispatch one request to the coordinator.
pub fn handle_request(ctx: &ListenCtx, request: Request) -> Response {
    let coordinator = &ctx.coordinator;
    let result = match request {
        Request::Subscribe => Ok(Response::Subscribed),
        Request::Status => {
            let (active, pending) = coordinator.workflow_counts();
            Ok(Response::Status {
                status: StatusDto {
                    version: PROTOCOL_VERSION.to_string(),
                    uptime_secs: ctx.started_at.elapsed().as_secs(),
                    degraded: coordinator.is_degraded(),
                    pool: coordinator.pool_status().into(),
                    sessions: coordinator.list_sessions().len(),
                    workflows_active: active,
                    workflows_pending: pending,
                },
            })
        }
        Request::SessionList => Ok(Response::Sessions {
            sessions: coordinator
                .list_sessions()
                .iter()
                .map(SessionSummary::from)
                .collect(),
        }),
        Request::SessionGet { session } | Request::ExecStatus { session } => coordinator
            .get_session_state(session)
            .map(|state| Response::Session {
                session: Box::new(SessionDetail::from(&state)),
            }),
        Request::SessionPause { session } | Request::ExecPause { session } => {
            coordinator.pause_session(session).map(|_| Response::Ok)
        }
        Request::SessionResume { session } | Request::ExecResume { session } => {
            coordinator.resume_session(session).map(|_| Response::Ok)
        }
        Request::SessionStop { session } | Request::ExecStop { session } => {
            coordinator.stop_session(session).map(|_| Response::Ok)
        }
        Request::SessionRemove { session } => {
            coordinator.remove_session(session).map(|_| Response::Ok)
        }
        Request::PlanCreate { requirement } => coordinator
            .create_session(&requirement)
            .map(|(session, workflow)| Response::PlanCreated { session, workflow }),
        Request::PlanApprove { session } => coordinator
            .approve_plan(session)
            .map(|tasks| Response::PlanApproved { session, tasks }),
        Request::PlanRevise { session, instruction } => coordinator
            .revise_plan(session, &instruction)
            .map(|workflow| Response::WorkflowDispatched { workflow }),
        Request::PlanCancel { session } => {
            coordinator.cancel_planning(session).map(|_| Response::Ok)
        }
        Request::PlanRestart { session } => coordinator
            .restart_planning(session)
            .map(|workflow| Response::WorkflowDispatched { workflow }),
        Request::PoolStatus => Ok(Response::Pool {
            pool: PoolStatusDto::from(coordinator.pool_status()),
        }),
        Request::PoolResize { size } => coordinator.resize_pool(size).map(|_| Response::Ok),
        Request::ExecStart { session } => coordinator
            .start_execution(session)
            .map(|workflows| Response::WorkflowsDispatched { workflows }),
        Request::WorkflowRetry { session, task } => coordinator
            .retry_task(session, task)
            .map(|workflow| Response::WorkflowDispatched { workflow }),
        Request::CoordinatorEvaluate => {
            coordinator.reconcile_once();
            Ok(Response::Ok)
        }
        Request::AgentComplete { session, workflow, stage, task, result, data } => {
            deliver_signal(ctx, session, workflow, stage, task, result, data)
        }
    };
    result.unwrap_or_else(|e| Response::Error { message: e.to_string() })
}

fn deliver_signal(
    ctx: &ListenCtx,
    session: apc_core::SessionId,
    workflow: apc_core::WorkflowId,
    stage: String,
    task: Option<apc_core::TaskId>,
    result: String,
    data: serde_json::Value,
) -> Result<Response, apc_engine::CoordinatorError> {
    let stage: Stage = match stage.parse() {
        Ok(stage) => stage,
        Err(e) => return Ok(Response::Error { message: e }),
    };
    let result: SignalResult = match result.parse() {
        Ok(result) => result,
        Err(e) => return Ok(Response::Error { message: e }),
    };
    let signal = CompletionSignal {
        session_id: session,
        workflow_id: workflow,
        stage,
        task_id: task,
        result,
        payload: data,
        received_at_ms: 0,
    };
    let delivery = ctx.coordinator.deliver_completion(signal)?;
    let delivery = match delivery {
        Delivery::Consumed => "consumed",
        Delivery::Retained => "retained",
        Delivery::Discarded => "discarded",
    };
    Ok(Response::SignalAccepted { delivery: delivery.to_string() })
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

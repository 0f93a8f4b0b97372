// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin IPC client: one request/response per call over the daemon socket.

use std::sync::atomic::{AtomicU64, Ordering};

use apc_daemon::{
    read_frame, write_frame, Request, RequestEnvelope, Response, ServerFrame,
};
use tokio::net::UnixStream;

use crate::exit_error::CliError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> String {
    format!("cli-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Send one request and wait for its correlated response.
pub async fn send(request: Request) -> Result<Response, CliError> {
    let socket = apc_daemon::env::socket_path();
    let stream = UnixStream::connect(&socket).await.map_err(|e| {
        CliError::Transport(format!("cannot reach apcd at {}: {e}", socket.display()))
    })?;
    let (mut reader, mut writer) = stream.into_split();

    let id = next_id();
    let envelope = RequestEnvelope { id: id.clone(), request };
    write_frame(&mut writer, &envelope).await?;

    loop {
        let frame: ServerFrame =
            read_frame(&mut reader, Some(apc_daemon::env::ipc_timeout())).await?;
        match frame {
            ServerFrame::Response(response) if response.id == id => {
                return match response.response {
                    Response::Error { message } => Err(CliError::Domain(message)),
                    other => Ok(other),
                };
            }
            ServerFrame::Response(stray) => {
                return Err(CliError::Transport(format!(
                    "response id mismatch: sent {id}, got {}",
                    stray.id
                )))
            }
            ServerFrame::Event { .. } => continue,
        }
    }
}

/// Subscribe and invoke `on_event` for every streamed event until the daemon
/// goes away or the process is interrupted.
pub async fn watch(on_event: impl Fn(&apc_core::Event)) -> Result<(), CliError> {
    let socket = apc_daemon::env::socket_path();
    let stream = UnixStream::connect(&socket).await.map_err(|e| {
        CliError::Transport(format!("cannot reach apcd at {}: {e}", socket.display()))
    })?;
    let (mut reader, mut writer) = stream.into_split();

    let envelope = RequestEnvelope { id: next_id(), request: Request::Subscribe };
    write_frame(&mut writer, &envelope).await?;

    loop {
        let frame: ServerFrame = read_frame(&mut reader, None).await?;
        if let ServerFrame::Event { event } = frame {
            on_event(&event);
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `apcd` — the Agentic Planning Coordinator daemon.

use std::sync::Arc;
use std::time::Instant;

use apc_daemon::env;
use apc_daemon::listener::{ListenCtx, Listener};
use apc_engine::{
    Coordinator, EngineConfig, ProcessRunner, Services, SharedClock, WorkflowRegistry,
};
use tokio::net::UnixListener;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_dir: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("cannot create log dir {}: {e}", log_dir.display());
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }
    let appender = tracing_appender::rolling::daily(log_dir, "apcd.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer())
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let state_dir = env::state_dir();
    let _guard = init_tracing(&env::log_dir());

    let (program, args) = env::agent_command();
    let config = EngineConfig {
        state_dir: state_dir.clone(),
        project_root: env::project_root(),
        work_dir: env::project_root(),
        pool_size: env::pool_size(),
        ..EngineConfig::default()
    };

    let runner = Arc::new(ProcessRunner::new(program, args));
    let services = match Services::new(config, SharedClock::system(), runner) {
        Ok(services) => services,
        Err(e) => {
            error!("pool configuration invalid: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let coordinator = Coordinator::new(services, WorkflowRegistry::with_builtins());
    match coordinator.recover() {
        Ok(recovered) if recovered > 0 => {
            info!(recovered, "non-terminal workflows reconstituted as paused")
        }
        Ok(_) => {}
        Err(e) => error!("recovery failed: {e}"),
    }
    coordinator.start();

    let socket_path = env::socket_path();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    if let Some(parent) = socket_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let unix = match UnixListener::bind(&socket_path) {
        Ok(unix) => unix,
        Err(e) => {
            error!("cannot bind {}: {e}", socket_path.display());
            return std::process::ExitCode::FAILURE;
        }
    };
    info!(socket = %socket_path.display(), "apcd listening");

    let ctx = Arc::new(ListenCtx { coordinator, started_at: Instant::now() });
    let listener = tokio::spawn(Listener::new(unix, ctx).run());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => error!("signal handling failed: {e}"),
    }
    listener.abort();
    let _ = std::fs::remove_file(&socket_path);
    std::process::ExitCode::SUCCESS
}

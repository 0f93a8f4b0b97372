// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Protocol version sent in status responses; clients warn on mismatch.
pub const PROTOCOL_VERSION: &str = "1";

/// Root state directory (`APC_STATE_DIR`, default `~/.local/state/apc`).
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("APC_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("apc")
}

/// Unix socket path (`APC_SOCKET`, default `{state_dir}/apcd.sock`).
pub fn socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("APC_SOCKET") {
        return PathBuf::from(path);
    }
    state_dir().join("apcd.sock")
}

/// Daemon log directory (`APC_LOG_DIR`, default `{state_dir}/logs`).
pub fn log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("APC_LOG_DIR") {
        return PathBuf::from(dir);
    }
    state_dir().join("logs")
}

/// Agent pool size (`APC_POOL_SIZE`, default 4).
pub fn pool_size() -> usize {
    std::env::var("APC_POOL_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4)
}

/// Agent command line (`APC_AGENT_CMD`), split on whitespace.
/// The first token is the program, the rest are leading arguments.
pub fn agent_command() -> (String, Vec<String>) {
    let raw = std::env::var("APC_AGENT_CMD").unwrap_or_else(|_| "apc-agent".to_string());
    let mut parts = raw.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_else(|| "apc-agent".to_string());
    (program, parts.collect())
}

/// Per-request IPC timeout (`APC_IPC_TIMEOUT_MS`, default 10s).
pub fn ipc_timeout() -> Duration {
    let ms = std::env::var("APC_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000);
    Duration::from_millis(ms)
}

/// Project root the coordinator serves (`APC_PROJECT_ROOT`, default cwd).
pub fn project_root() -> PathBuf {
    if let Ok(root) = std::env::var("APC_PROJECT_ROOT") {
        return PathBuf::from(root);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

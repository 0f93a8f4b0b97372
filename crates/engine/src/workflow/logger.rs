// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-workflow log file.

use std::io::Write;
use std::path::{Path, PathBuf};

use apc_core::{Clock, WorkflowId};

use crate::services::SharedClock;

/// Writes ISO-timestamped lines to the workflow's log file and mirrors them
/// to the process log.
#[derive(Clone)]
pub struct WorkflowLogger {
    workflow_id: WorkflowId,
    path: PathBuf,
    clock: SharedClock,
}

impl WorkflowLogger {
    pub fn new(workflow_id: WorkflowId, path: PathBuf, clock: SharedClock) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "cannot create log dir");
            }
        }
        Self { workflow_id, path, clock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, message: &str) {
        tracing::info!(workflow = %self.workflow_id, "{message}");
        let ts = chrono::DateTime::from_timestamp_millis(self.clock.epoch_ms() as i64)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_default();
        let line = format!("{ts} {message}\n");
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "workflow log write failed");
        }
    }
}

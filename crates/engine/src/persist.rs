// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence: the minimum state required to resume in-flight workflows
//! after a restart.
//!
//! Layout under the state dir:
//!
//! ```text
//! sessions/{sid}/session.json
//! sessions/{sid}/plan.md
//! sessions/{sid}/backups/plan_backup_{ts}.md
//! sessions/{sid}/logs/{workflowId}.log
//! sessions/{sid}/logs/agents/{workflowId}_{agent}.log
//! sessions/{sid}/workflows/{workflowId}.state.json
//! pool_{roothash}.json
//! ```
//!
//! All writes are write-to-temp + atomic rename; no cross-file transaction
//! is needed because each workflow owns exactly one state file.

use std::fs;
use std::path::{Path, PathBuf};

use apc_core::{Session, SessionId, TaskId, WorkflowId, WorkflowRecord};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-system persistence rooted at the coordinator state dir.
#[derive(Clone)]
pub struct Persistence {
    state_dir: PathBuf,
}

impl Persistence {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { state_dir: state_dir.into() }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn session_dir(&self, session: SessionId) -> PathBuf {
        self.state_dir.join("sessions").join(session.as_str())
    }

    pub fn plan_path(&self, session: SessionId) -> PathBuf {
        self.session_dir(session).join("plan.md")
    }

    pub fn workflow_log_path(&self, session: SessionId, workflow: WorkflowId) -> PathBuf {
        self.session_dir(session).join("logs").join(format!("{workflow}.log"))
    }

    pub fn agent_log_path(
        &self,
        session: SessionId,
        workflow: WorkflowId,
        agent: &str,
    ) -> PathBuf {
        self.session_dir(session)
            .join("logs")
            .join("agents")
            .join(format!("{workflow}_{agent}.log"))
    }

    /// Path the context-gathering workflow writes its brief to.
    pub fn context_brief_path(&self, session: SessionId) -> PathBuf {
        self.session_dir(session).join("context.md")
    }

    fn workflows_dir(&self, session: SessionId) -> PathBuf {
        self.session_dir(session).join("workflows")
    }

    fn workflow_state_path(&self, session: SessionId, workflow: WorkflowId) -> PathBuf {
        self.workflows_dir(session).join(format!("{workflow}.state.json"))
    }

    /// Create the directory skeleton for a session.
    pub fn ensure_session_dirs(&self, session: SessionId) -> Result<(), PersistError> {
        fs::create_dir_all(self.session_dir(session).join("backups"))?;
        fs::create_dir_all(self.session_dir(session).join("logs").join("agents"))?;
        fs::create_dir_all(self.workflows_dir(session))?;
        Ok(())
    }

    // --- sessions ---------------------------------------------------------

    pub fn save_session(&self, session: &Session) -> Result<(), PersistError> {
        self.ensure_session_dirs(session.id)?;
        let path = self.session_dir(session.id).join("session.json");
        write_atomic(&path, &serde_json::to_vec_pretty(session)?)?;
        Ok(())
    }

    pub fn load_sessions(&self) -> Result<Vec<Session>, PersistError> {
        let sessions_dir = self.state_dir.join("sessions");
        let mut sessions = Vec::new();
        let entries = match fs::read_dir(&sessions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path().join("session.json");
            if !path.exists() {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(PersistError::from)
                .and_then(|s| serde_json::from_str(&s).map_err(PersistError::from))
            {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session")
                }
            }
        }
        sessions.sort_by_key(|s: &Session| s.created_at_ms);
        Ok(sessions)
    }

    pub fn remove_session(&self, session: SessionId) -> Result<(), PersistError> {
        let dir = self.session_dir(session);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Copy the current plan into `backups/` with a timestamped name.
    /// Returns the backup path, or None when there is no plan yet.
    pub fn backup_plan(
        &self,
        session: SessionId,
        epoch_ms: u64,
    ) -> Result<Option<PathBuf>, PersistError> {
        let plan = self.plan_path(session);
        if !plan.exists() {
            return Ok(None);
        }
        let ts = chrono::DateTime::from_timestamp_millis(epoch_ms as i64)
            .map(|dt| dt.format("%Y%m%d_%H%M%S").to_string())
            .unwrap_or_else(|| epoch_ms.to_string());
        let backup = self
            .session_dir(session)
            .join("backups")
            .join(format!("plan_backup_{ts}.md"));
        fs::copy(&plan, &backup)?;
        Ok(Some(backup))
    }

    /// Tick a task's checklist line (`- [ ]` → `- [x]`) in the plan file so
    /// registry rebuilds after a restart see completed work.
    pub fn mark_task_checked(
        &self,
        session: SessionId,
        task: TaskId,
    ) -> Result<(), PersistError> {
        let path = self.plan_path(session);
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(&path)?;
        let needle = format!("] {}:", task.as_str());
        let updated: String = content
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                if trimmed.starts_with("- [ ]") && line.contains(&needle) {
                    line.replacen("- [ ]", "- [x]", 1)
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let mut updated = updated;
        if content.ends_with('\n') {
            updated.push('\n');
        }
        write_atomic(&path, updated.as_bytes())?;
        Ok(())
    }

    // --- workflows --------------------------------------------------------

    pub fn save_workflow(&self, record: &WorkflowRecord) -> Result<(), PersistError> {
        self.ensure_session_dirs(record.session_id)?;
        let path = self.workflow_state_path(record.session_id, record.id);
        write_atomic(&path, &serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }

    /// Load every persisted workflow record across all sessions.
    pub fn load_workflows(&self) -> Result<Vec<WorkflowRecord>, PersistError> {
        let sessions_dir = self.state_dir.join("sessions");
        let mut records = Vec::new();
        let entries = match fs::read_dir(&sessions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let workflows = entry?.path().join("workflows");
            let files = match fs::read_dir(&workflows) {
                Ok(files) => files,
                Err(_) => continue,
            };
            for file in files {
                let path = file?.path();
                if path.extension().map(|e| e != "json").unwrap_or(true) {
                    continue;
                }
                match fs::read_to_string(&path)
                    .map_err(PersistError::from)
                    .and_then(|s| serde_json::from_str(&s).map_err(PersistError::from))
                {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable workflow state"
                    ),
                }
            }
        }
        records.sort_by_key(|r: &WorkflowRecord| (r.session_id.as_str().to_string(), r.updated_at_ms));
        Ok(records)
    }

    pub fn delete_workflow(
        &self,
        session: SessionId,
        workflow: WorkflowId,
    ) -> Result<(), PersistError> {
        let path = self.workflow_state_path(session, workflow);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // --- pool -------------------------------------------------------------

    fn pool_state_path(&self, project_root: &Path) -> PathBuf {
        let digest = Sha256::digest(project_root.to_string_lossy().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.state_dir.join(format!("pool_{}.json", apc_core::short(&hex, 16)))
    }

    pub fn save_pool_size(&self, project_root: &Path, size: usize) -> Result<(), PersistError> {
        fs::create_dir_all(&self.state_dir)?;
        let path = self.pool_state_path(project_root);
        write_atomic(&path, &serde_json::to_vec(&serde_json::json!({ "size": size }))?)?;
        Ok(())
    }

    pub fn load_pool_size(&self, project_root: &Path) -> Option<usize> {
        let path = self.pool_state_path(project_root);
        let content = fs::read_to_string(path).ok()?;
        let value: serde_json::Value = serde_json::from_str(&content).ok()?;
        value.get("size")?.as_u64().map(|n| n as usize)
    }
}

/// Write to `{path}.tmp`, then atomically rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;

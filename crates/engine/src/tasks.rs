// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task registry: current tasks parsed from each session's active plan.

use std::collections::HashMap;
use std::sync::Arc;

use apc_core::{Event, SessionId, Task, TaskId, TaskStatus};
use apc_plan::Plan;
use parking_lot::Mutex;
use thiserror::Error;

use crate::event_bus::EventBus;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
}

/// In-memory task table, replaced wholesale when a plan loads.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<TaskId, Task>>>,
    events: EventBus,
}

impl TaskRegistry {
    pub fn new(events: EventBus) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), events }
    }

    /// Load a session's tasks from a parsed plan, replacing any previous
    /// tasks of that session. Checklist lines already marked done come in as
    /// completed. Returns the loaded ids in plan order.
    pub fn load_from_plan(&self, plan: &Plan) -> Vec<TaskId> {
        let mut inner = self.inner.lock();
        inner.retain(|id, _| id.session_id() != plan.session_id);
        let mut loaded = Vec::with_capacity(plan.tasks.len());
        for entry in plan.tasks.values() {
            let mut task = Task::new(entry.id, entry.description.clone());
            task.depends_on = entry.depends_on.clone();
            task.target_files = entry.target_files.clone();
            task.pipeline = entry
                .pipeline
                .clone()
                .map(|name| apc_core::PipelineConfig { name });
            if entry.completed {
                task.status = TaskStatus::Completed;
            }
            loaded.push(task.id);
            inner.insert(task.id, task);
        }
        loaded
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.lock().get(&id).cloned()
    }

    /// All tasks of a session, ordered by id.
    pub fn list_by_session(&self, session: SessionId) -> Vec<Task> {
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> =
            inner.values().filter(|t| t.session_id() == session).cloned().collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Exactly the tasks whose dependencies are all completed and that are
    /// not deferred, in progress, or terminal. Stable-ordered by id.
    pub fn ready_tasks(&self, session: SessionId) -> Vec<TaskId> {
        let inner = self.inner.lock();
        let mut ready: Vec<TaskId> = inner
            .values()
            .filter(|t| t.session_id() == session)
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
            .filter(|t| {
                t.depends_on.iter().all(|dep| {
                    inner.get(dep).map(|d| d.status == TaskStatus::Completed).unwrap_or(false)
                })
            })
            .map(|t| t.id)
            .collect();
        ready.sort();
        ready
    }

    /// Set a task's status, firing a `task:status` event.
    pub fn mark_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), TaskError> {
        {
            let mut inner = self.inner.lock();
            let task = inner.get_mut(&id).ok_or(TaskError::UnknownTask(id))?;
            task.status = status;
            task.status_reason = reason.map(str::to_string);
        }
        self.events.fire(&Event::TaskStatusChanged {
            id,
            status,
            reason: reason.map(str::to_string),
        });
        Ok(())
    }

    /// Park a task: it will not become ready until undeferred.
    pub fn defer(&self, id: TaskId, blocked_by: Option<&str>) -> Result<(), TaskError> {
        self.mark_status(id, TaskStatus::Deferred, blocked_by)
    }

    /// Return a deferred task to the pending set.
    pub fn undefer(&self, id: TaskId) -> Result<(), TaskError> {
        let deferred = {
            let inner = self.inner.lock();
            inner.get(&id).ok_or(TaskError::UnknownTask(id))?.status == TaskStatus::Deferred
        };
        if deferred {
            self.mark_status(id, TaskStatus::Pending, None)?;
        }
        Ok(())
    }

    /// True when every task of the session is completed.
    pub fn all_completed(&self, session: SessionId) -> bool {
        let inner = self.inner.lock();
        let mut any = false;
        for task in inner.values().filter(|t| t.session_id() == session) {
            any = true;
            if task.status != TaskStatus::Completed {
                return false;
            }
        }
        any
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checklist-line plan parser.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use apc_core::{SessionId, TaskId, TaskIdError};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing or validating a plan file.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("plan {0} contains no task lines")]
    NoTasks(PathBuf),
    #[error("line {line}: {source}")]
    BadTaskId {
        line: usize,
        #[source]
        source: TaskIdError,
    },
    #[error("duplicate task id {0}")]
    DuplicateTask(TaskId),
    #[error("task {task} depends on unknown task {dep}")]
    UnknownDependency { task: TaskId, dep: TaskId },
    #[error("task {0} depends on itself")]
    SelfDependency(TaskId),
    #[error("task {task} belongs to session {found}, expected {expected}")]
    SessionMismatch {
        task: TaskId,
        found: SessionId,
        expected: SessionId,
    },
    #[error("dependency cycle among tasks: {}", members.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", "))]
    DependencyCycle { members: Vec<TaskId> },
}

/// One task entry parsed from a plan checklist line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: TaskId,
    pub description: String,
    pub depends_on: BTreeSet<TaskId>,
    pub target_files: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// True for `- [x]` lines (already done in a superseded plan)
    pub completed: bool,
}

/// A parsed, validated plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub path: PathBuf,
    pub session_id: SessionId,
    /// Tasks in plan order
    pub tasks: IndexMap<TaskId, PlanTask>,
}

impl Plan {
    /// Task ids in plan order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    pub fn get(&self, id: TaskId) -> Option<&PlanTask> {
        self.tasks.get(&id)
    }

    /// Ids of tasks that transitively depend on any of `roots`.
    ///
    /// Used by revision impact analysis: a change to a task invalidates
    /// everything built on top of it. The result excludes the roots.
    pub fn dependents_of(&self, roots: &BTreeSet<TaskId>) -> BTreeSet<TaskId> {
        let mut affected: BTreeSet<TaskId> = BTreeSet::new();
        let mut queue: VecDeque<TaskId> = roots.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            for task in self.tasks.values() {
                if task.depends_on.contains(&current)
                    && !roots.contains(&task.id)
                    && affected.insert(task.id)
                {
                    queue.push_back(task.id);
                }
            }
        }
        affected
    }
}

fn task_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"^\s*-\s*\[(?P<done>[ xX])\]\s+(?P<id>\S+?):\s+(?P<rest>.+?)\s*$").unwrap()
    })
}

fn attr_group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"\((?P<key>deps|files|pipeline):\s*(?P<value>[^)]*)\)").unwrap()
    })
}

/// Read and parse a plan file.
pub fn parse_plan_file(path: &Path) -> Result<Plan, PlanError> {
    let content = std::fs::read_to_string(path)?;
    parse_plan(path, &content)
}

/// Parse plan content.
///
/// Validation: every id must be well-formed and unique, every dependency must
/// name a task in the same plan, all tasks must share one session, and the
/// dependency graph must be acyclic. A cycle is reported, never broken.
pub fn parse_plan(path: &Path, content: &str) -> Result<Plan, PlanError> {
    let mut tasks: IndexMap<TaskId, PlanTask> = IndexMap::new();

    for (lineno, line) in content.lines().enumerate() {
        let Some(caps) = task_line_re().captures(line) else {
            continue;
        };
        let id = TaskId::parse(&caps["id"])
            .map_err(|source| PlanError::BadTaskId { line: lineno + 1, source })?;
        let completed = &caps["done"] != " ";

        let rest = &caps["rest"];
        let mut depends_on = BTreeSet::new();
        let mut target_files = BTreeSet::new();
        let mut pipeline = None;
        for group in attr_group_re().captures_iter(rest) {
            let values = group["value"]
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty());
            match &group["key"] {
                "deps" => {
                    for dep in values {
                        let dep = TaskId::parse(dep)
                            .map_err(|source| PlanError::BadTaskId { line: lineno + 1, source })?;
                        depends_on.insert(dep);
                    }
                }
                "files" => target_files.extend(values.map(PathBuf::from)),
                "pipeline" => pipeline = values.last().map(str::to_string),
                _ => {}
            }
        }
        let description = attr_group_re().replace_all(rest, "").trim().to_string();

        if depends_on.contains(&id) {
            return Err(PlanError::SelfDependency(id));
        }
        let task = PlanTask { id, description, depends_on, target_files, pipeline, completed };
        if tasks.insert(id, task).is_some() {
            return Err(PlanError::DuplicateTask(id));
        }
    }

    let Some(first) = tasks.keys().next() else {
        return Err(PlanError::NoTasks(path.to_path_buf()));
    };
    let session_id = first.session_id();

    for task in tasks.values() {
        if task.id.session_id() != session_id {
            return Err(PlanError::SessionMismatch {
                task: task.id,
                found: task.id.session_id(),
                expected: session_id,
            });
        }
        for dep in &task.depends_on {
            if !tasks.contains_key(dep) {
                return Err(PlanError::UnknownDependency { task: task.id, dep: *dep });
            }
        }
    }

    check_acyclic(&tasks)?;

    tracing::debug!(
        path = %path.display(),
        tasks = tasks.len(),
        session = %session_id,
        "parsed plan"
    );

    Ok(Plan { path: path.to_path_buf(), session_id, tasks })
}

/// Kahn's algorithm; leftover nodes are the cycle members.
fn check_acyclic(tasks: &IndexMap<TaskId, PlanTask>) -> Result<(), PlanError> {
    let mut in_degree: HashMap<TaskId, usize> =
        tasks.keys().map(|id| (*id, 0)).collect();
    for task in tasks.values() {
        for _ in &task.depends_on {
            if let Some(d) = in_degree.get_mut(&task.id) {
                *d += 1;
            }
        }
    }

    let mut ready: VecDeque<TaskId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut resolved = 0usize;
    while let Some(current) = ready.pop_front() {
        resolved += 1;
        for task in tasks.values() {
            if task.depends_on.contains(&current) {
                if let Some(d) = in_degree.get_mut(&task.id) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(task.id);
                    }
                }
            }
        }
    }

    if resolved == tasks.len() {
        return Ok(());
    }
    let mut members: Vec<TaskId> = in_degree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id)
        .collect();
    members.sort();
    Err(PlanError::DependencyCycle { members })
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;

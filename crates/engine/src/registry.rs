// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow registry: type name → factory + metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::services::EngineConfig;
use crate::workflow::{
    ContextGatherInput, ContextGatherWorkflow, ErrorResolutionInput, ErrorResolutionWorkflow,
    PlanningInput, PlanningWorkflow, RevisionInput, RevisionWorkflow, TaskImplInput,
    TaskImplWorkflow, WorkflowSpec,
};

/// Errors from registry lookups and factory invocations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown workflow type: {0}")]
    UnknownType(String),
    #[error("invalid input for workflow type {kind}: {source}")]
    BadInput {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Display metadata registered alongside a factory.
#[derive(Debug, Clone)]
pub struct WorkflowMeta {
    pub display_name: &'static str,
    /// Whether the type queues into the external pipeline
    pub requires_pipeline: bool,
    /// Coordinator-instruction snippet surfaced to operators
    pub instructions: &'static str,
}

/// Builds a fresh workflow instance from its JSON input.
pub type WorkflowFactory =
    Arc<dyn Fn(serde_json::Value, &EngineConfig) -> Result<Box<dyn WorkflowSpec>, RegistryError>
        + Send
        + Sync>;

struct Registration {
    meta: WorkflowMeta,
    factory: WorkflowFactory,
}

/// Mapping from workflow-type-name to factory and metadata.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    inner: Arc<Mutex<HashMap<String, Registration>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in workflow type.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(
            "planning",
            WorkflowMeta {
                display_name: "Planning",
                requires_pipeline: false,
                instructions: "creates the initial plan from a requirement",
            },
            |input, config| {
                let input: PlanningInput = parse_input("planning", input)?;
                Ok(Box::new(PlanningWorkflow::new(input, config.planning_iteration_cap)))
            },
        );
        registry.register(
            "plan_revision",
            WorkflowMeta {
                display_name: "Plan revision",
                requires_pipeline: false,
                instructions: "rewrites the plan under a blocking conflict",
            },
            |input, config| {
                let input: RevisionInput = parse_input("plan_revision", input)?;
                Ok(Box::new(RevisionWorkflow::new(input, config.review_loop_cap)))
            },
        );
        registry.register(
            "task_implementation",
            WorkflowMeta {
                display_name: "Task implementation",
                requires_pipeline: true,
                instructions: "implements one plan task under exclusive occupancy",
            },
            |input, config| {
                let input: TaskImplInput = parse_input("task_implementation", input)?;
                Ok(Box::new(TaskImplWorkflow::new(input, config.review_loop_cap)))
            },
        );
        registry.register(
            "error_resolution",
            WorkflowMeta {
                display_name: "Error resolution",
                requires_pipeline: false,
                instructions: "fixes a structured error list",
            },
            |input, config| {
                let input: ErrorResolutionInput = parse_input("error_resolution", input)?;
                Ok(Box::new(ErrorResolutionWorkflow::new(input, config.review_loop_cap)))
            },
        );
        registry.register(
            "context_gathering",
            WorkflowMeta {
                display_name: "Context gathering",
                requires_pipeline: false,
                instructions: "writes a context brief for later prompts",
            },
            |input, _config| {
                let input: ContextGatherInput = parse_input("context_gathering", input)?;
                Ok(Box::new(ContextGatherWorkflow::new(input)))
            },
        );
        registry
    }

    /// Register a type. Idempotent per process: a second registration under
    /// the same name overwrites with a warning.
    pub fn register(
        &self,
        kind: &str,
        meta: WorkflowMeta,
        factory: impl Fn(serde_json::Value, &EngineConfig) -> Result<Box<dyn WorkflowSpec>, RegistryError>
            + Send
            + Sync
            + 'static,
    ) {
        let mut inner = self.inner.lock();
        if inner.contains_key(kind) {
            tracing::warn!(kind, "workflow type re-registered, overwriting");
        }
        inner.insert(kind.to_string(), Registration { meta, factory: Arc::new(factory) });
    }

    /// Instantiate a workflow of the given type.
    pub fn create(
        &self,
        kind: &str,
        input: serde_json::Value,
        config: &EngineConfig,
    ) -> Result<Box<dyn WorkflowSpec>, RegistryError> {
        let factory = {
            let inner = self.inner.lock();
            let registration = inner
                .get(kind)
                .ok_or_else(|| RegistryError::UnknownType(kind.to_string()))?;
            Arc::clone(&registration.factory)
        };
        factory(input, config)
    }

    pub fn meta(&self, kind: &str) -> Option<WorkflowMeta> {
        self.inner.lock().get(kind).map(|r| r.meta.clone())
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.inner.lock().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(
    kind: &str,
    input: serde_json::Value,
) -> Result<T, RegistryError> {
    serde_json::from_value(input).map_err(|source| RegistryError::BadInput {
        kind: kind.to_string(),
        source,
    })
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

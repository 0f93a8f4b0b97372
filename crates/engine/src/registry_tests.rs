// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::workflow::{PhaseContext, PhaseOutcome, WorkflowError};
use async_trait::async_trait;

#[test]
fn builtins_are_registered() {
    let registry = WorkflowRegistry::with_builtins();
    assert_eq!(
        registry.kinds(),
        vec![
            "context_gathering",
            "error_resolution",
            "plan_revision",
            "planning",
            "task_implementation",
        ]
    );
    assert!(registry.meta("task_implementation").unwrap().requires_pipeline);
    assert!(!registry.meta("planning").unwrap().requires_pipeline);
}

#[test]
fn create_parses_input() {
    let registry = WorkflowRegistry::with_builtins();
    let config = EngineConfig::default();
    let workflow = registry
        .create(
            "planning",
            serde_json::json!({ "requirement": "build it" }),
            &config,
        )
        .unwrap();
    assert_eq!(workflow.kind(), "planning");
    assert_eq!(workflow.phases(), &["planner", "analysts", "finalize"]);
}

#[test]
fn create_rejects_bad_input() {
    let registry = WorkflowRegistry::with_builtins();
    let config = EngineConfig::default();
    let err = registry
        .create("task_implementation", serde_json::json!({}), &config)
        .unwrap_err();
    assert!(matches!(err, RegistryError::BadInput { .. }));
}

#[test]
fn unknown_type_is_an_error() {
    let registry = WorkflowRegistry::with_builtins();
    let config = EngineConfig::default();
    assert!(matches!(
        registry.create("mystery", serde_json::Value::Null, &config),
        Err(RegistryError::UnknownType(_))
    ));
}

struct NoopWorkflow;

#[async_trait]
impl crate::workflow::WorkflowSpec for NoopWorkflow {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn phases(&self) -> &'static [&'static str] {
        &["only"]
    }

    async fn execute_phase(
        &mut self,
        _index: usize,
        _ctx: &PhaseContext,
    ) -> Result<PhaseOutcome, WorkflowError> {
        Ok(PhaseOutcome::Advance)
    }
}

#[test]
fn reregistration_overwrites() {
    let registry = WorkflowRegistry::new();
    let meta = WorkflowMeta {
        display_name: "Noop",
        requires_pipeline: false,
        instructions: "does nothing",
    };
    registry.register("noop", meta.clone(), |_, _| Ok(Box::new(NoopWorkflow)));
    registry.register(
        "noop",
        WorkflowMeta { display_name: "Noop v2", ..meta },
        |_, _| Ok(Box::new(NoopWorkflow)),
    );
    assert_eq!(registry.kinds().len(), 1);
    assert_eq!(registry.meta("noop").unwrap().display_name, "Noop v2");
}

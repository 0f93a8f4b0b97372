// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planning workflow: planner → analysts → finalize.
//!
//! Three analysts review the planner's draft; any `critical` verdict rewinds
//! to the planner until the iteration cap, after which finalize runs anyway
//! with `forced_finalize` set.

use std::time::Duration;

use apc_core::{SignalResult, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::phase_ctx::{AgentDisposition, PhaseContext};
use super::{prompts, PhaseOutcome, WorkflowError, WorkflowSpec};

const PHASES: &[&str] = &["planner", "analysts", "finalize"];

const ANALYST_PERSPECTIVES: [&str; 3] =
    ["completeness", "dependency ordering", "risk and feasibility"];

/// Input for a new planning workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningInput {
    pub requirement: String,
}

/// Output shape: `{planPath, iterations, forcedFinalize, warnings?}`.
pub struct PlanningWorkflow {
    input: PlanningInput,
    iteration: u32,
    iteration_cap: u32,
    forced_finalize: bool,
    warnings: Vec<String>,
    analyst_feedback: Vec<String>,
    plan_path: Option<std::path::PathBuf>,
}

impl PlanningWorkflow {
    pub fn new(input: PlanningInput, iteration_cap: u32) -> Self {
        Self {
            input,
            iteration: 0,
            iteration_cap,
            forced_finalize: false,
            warnings: Vec::new(),
            analyst_feedback: Vec::new(),
            plan_path: None,
        }
    }

    async fn run_planner(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        self.iteration += 1;
        let plan_path = ctx.services.persist.plan_path(ctx.session_id());
        let prompt =
            prompts::planner_prompt(&self.input.requirement, &plan_path, &self.analyst_feedback);
        self.analyst_feedback.clear();

        let signal = ctx
            .run_agent("planner", Stage::Planning, None, prompt, AgentDisposition::Bench)
            .await?;
        if signal.result != SignalResult::Success {
            return Err(WorkflowError::Permanent(format!(
                "planner reported {} on iteration {}",
                signal.result, self.iteration
            )));
        }
        self.plan_path = Some(plan_path);
        Ok(PhaseOutcome::Advance)
    }

    async fn run_analysts(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let plan_path = ctx.services.persist.plan_path(ctx.session_id());
        let mut any_critical = false;

        for perspective in ANALYST_PERSPECTIVES {
            let prompt = prompts::analyst_prompt(&plan_path, perspective);
            let signal = ctx
                .run_agent("analyst", Stage::Analysis, None, prompt, AgentDisposition::Release)
                .await?;
            let feedback = signal
                .payload
                .get("issues")
                .map(|v| v.to_string())
                .unwrap_or_default();
            match signal.result {
                SignalResult::Critical => {
                    any_critical = true;
                    ctx.log(&format!("analyst ({perspective}) verdict: critical"));
                    if !feedback.is_empty() {
                        self.analyst_feedback.push(format!("[{perspective}] {feedback}"));
                    }
                }
                SignalResult::Minor => {
                    ctx.log(&format!("analyst ({perspective}) verdict: minor"));
                    self.warnings.push(format!("[{perspective}] {feedback}"));
                }
                _ => ctx.log(&format!("analyst ({perspective}) verdict: pass")),
            }
        }

        if any_critical {
            if self.iteration < self.iteration_cap {
                return Ok(PhaseOutcome::Rewind { to: 0 });
            }
            ctx.log(&format!(
                "iteration cap {} reached with critical issues, finalizing anyway",
                self.iteration_cap
            ));
            self.forced_finalize = true;
        }
        Ok(PhaseOutcome::Advance)
    }

    async fn run_finalize(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        // Benched planner from the last iteration finalizes the plan text
        let plan_path = ctx.services.persist.plan_path(ctx.session_id());
        let prompt = format!(
            "Finalize the plan at {}: resolve formatting, number tasks\n\
             consistently, and confirm every checklist line parses.\n",
            plan_path.display(),
        );
        let signal = ctx
            .run_agent("planner", Stage::Finalize, None, prompt, AgentDisposition::Release)
            .await?;
        if signal.result != SignalResult::Success {
            return Err(WorkflowError::Permanent("plan finalize failed".to_string()));
        }

        // A plan that cannot be parsed (or has a dependency cycle) is a
        // validation failure, not something to paper over.
        apc_plan::parse_plan_file(&plan_path)
            .map_err(|e| WorkflowError::Permanent(format!("plan validation failed: {e}")))?;
        self.plan_path = Some(plan_path);
        Ok(PhaseOutcome::Advance)
    }
}

#[async_trait]
impl WorkflowSpec for PlanningWorkflow {
    fn kind(&self) -> &'static str {
        "planning"
    }

    fn phases(&self) -> &'static [&'static str] {
        PHASES
    }

    async fn execute_phase(
        &mut self,
        index: usize,
        ctx: &PhaseContext,
    ) -> Result<PhaseOutcome, WorkflowError> {
        match index {
            0 => self.run_planner(ctx).await,
            1 => self.run_analysts(ctx).await,
            _ => self.run_finalize(ctx).await,
        }
    }

    fn signal_timeout(&self, base: Duration) -> Duration {
        // Iterative planning prompts run long
        base.saturating_mul(3)
    }

    fn output(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "planPath": self.plan_path.as_ref().map(|p| p.display().to_string()),
            "iterations": self.iteration,
            "forcedFinalize": self.forced_finalize,
            "warnings": self.warnings,
        }))
    }

    fn progress_message(&self, phase: &str) -> String {
        match phase {
            "planner" => format!("drafting plan (iteration {})", self.iteration + 1),
            "analysts" => "analysts reviewing plan".to_string(),
            _ => "finalizing plan".to_string(),
        }
    }
}

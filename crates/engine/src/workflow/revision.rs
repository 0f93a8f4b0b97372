// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan-revision workflow: analyze_impact → planner → review → finalize.
//!
//! Revision is blocking: analyze_impact declares a `pause_others` conflict
//! over the affected task set (or `*` for global revisions) before the
//! planner touches the plan, and finalize clears it.

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use apc_core::{ConflictResolution, ConflictScope, SignalResult, Stage, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::phase_ctx::{AgentDisposition, PhaseContext};
use super::{prompts, PhaseOutcome, WorkflowError, WorkflowSpec};

const PHASES: &[&str] = &["analyze_impact", "planner", "review", "finalize"];

/// Phrases that mark a revision as touching the whole plan.
const GLOBAL_PHRASES: [&str; 6] = [
    "entire plan",
    "whole plan",
    "all tasks",
    "every task",
    "overall architecture",
    "start over",
];

/// Input for a plan-revision workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInput {
    pub instruction: String,
}

pub struct RevisionWorkflow {
    input: RevisionInput,
    review_cap: u32,
    review_rounds: u32,
    scope: Option<ConflictScope>,
    reviewer_feedback: Option<String>,
}

fn task_mention_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        regex::Regex::new(r"\b[a-z0-9]+_T[0-9]+\b").unwrap()
    })
}

impl RevisionWorkflow {
    pub fn new(input: RevisionInput, review_cap: u32) -> Self {
        Self {
            input,
            review_cap,
            review_rounds: 0,
            scope: None,
            reviewer_feedback: None,
        }
    }

    /// Affected set: tasks named in the instruction plus everything that
    /// transitively depends on them; a global phrase widens to `*`.
    fn compute_scope(&self, ctx: &PhaseContext) -> Result<ConflictScope, WorkflowError> {
        let lowered = self.input.instruction.to_lowercase();
        if GLOBAL_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
            return Ok(ConflictScope::All);
        }

        let plan_path = ctx.services.persist.plan_path(ctx.session_id());
        let plan = apc_plan::parse_plan_file(&plan_path)
            .map_err(|e| WorkflowError::Permanent(format!("cannot analyze plan: {e}")))?;

        let mut roots: BTreeSet<TaskId> = BTreeSet::new();
        for capture in task_mention_re().find_iter(&self.input.instruction) {
            if let Ok(task) = TaskId::parse(capture.as_str()) {
                if plan.get(task).is_some() {
                    roots.insert(task);
                }
            }
        }
        if roots.is_empty() {
            // Nothing directly named: treat as global to stay safe
            return Ok(ConflictScope::All);
        }
        let mut affected = plan.dependents_of(&roots);
        affected.extend(roots);
        Ok(ConflictScope::Tasks(affected))
    }

    async fn analyze_impact(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let scope = self.compute_scope(ctx)?;
        ctx.log(&format!("revision impact: [{scope}]"));
        ctx.declare_conflict(
            scope.clone(),
            ConflictResolution::PauseOthers,
            "plan revision in flight",
        );
        self.scope = Some(scope);
        Ok(PhaseOutcome::Advance)
    }

    async fn run_planner(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let services = &ctx.services;
        let plan_path = services.persist.plan_path(ctx.session_id());
        // Superseded plans are backed up, never deleted
        if let Ok(Some(backup)) = services.persist.backup_plan(ctx.session_id(), services.now_ms())
        {
            ctx.log(&format!("backed up plan to {}", backup.display()));
        }

        let affected = self
            .scope
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "*".to_string());
        let mut prompt = prompts::revision_prompt(&self.input.instruction, &plan_path, &affected);
        if let Some(feedback) = self.reviewer_feedback.take() {
            prompt.push_str("\nReviewer feedback to address:\n");
            prompt.push_str(&feedback);
            prompt.push('\n');
        }

        let signal = ctx
            .run_agent("planner", Stage::Planning, None, prompt, AgentDisposition::Bench)
            .await?;
        if signal.result != SignalResult::Success {
            return Err(WorkflowError::Permanent("revision planner failed".to_string()));
        }
        Ok(PhaseOutcome::Advance)
    }

    async fn run_review(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        self.review_rounds += 1;
        let plan_path = ctx.services.persist.plan_path(ctx.session_id());
        let prompt = format!(
            "Review the revised plan at {} against this instruction:\n{}\n\
             Report approved or changes_requested with feedback.\n",
            plan_path.display(),
            self.input.instruction,
        );
        let signal = ctx
            .run_agent("reviewer", Stage::Review, None, prompt, AgentDisposition::Release)
            .await?;
        match signal.result {
            SignalResult::Approved => Ok(PhaseOutcome::Advance),
            _ if self.review_rounds < self.review_cap => {
                self.reviewer_feedback = signal
                    .payload
                    .get("feedback")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                // Planner is benched; the rewind reuses it
                Ok(PhaseOutcome::Rewind { to: 1 })
            }
            _ => {
                ctx.log("review cap reached, accepting revision as-is");
                Ok(PhaseOutcome::Advance)
            }
        }
    }

    async fn run_finalize(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let services = &ctx.services;
        let plan_path = services.persist.plan_path(ctx.session_id());
        let plan = apc_plan::parse_plan_file(&plan_path)
            .map_err(|e| WorkflowError::Permanent(format!("revised plan invalid: {e}")))?;
        services.tasks.load_from_plan(&plan);
        ctx.log(&format!("revised plan loaded: {} tasks", plan.tasks.len()));
        // Unblocks everything the conflict paused
        ctx.clear_conflicts();
        Ok(PhaseOutcome::Advance)
    }
}

#[async_trait]
impl WorkflowSpec for RevisionWorkflow {
    fn kind(&self) -> &'static str {
        "plan_revision"
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
            0 => self.analyze_impact(ctx).await,
            1 => self.run_planner(ctx).await,
            2 => self.run_review(ctx).await,
            _ => self.run_finalize(ctx).await,
        }
    }

    fn signal_timeout(&self, base: Duration) -> Duration {
        base.saturating_mul(2)
    }

    fn output(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "affected": self.scope.as_ref().map(|s| s.to_string()),
            "reviewRounds": self.review_rounds,
        }))
    }

    fn progress_message(&self, phase: &str) -> String {
        match phase {
            "analyze_impact" => "computing revision impact".to_string(),
            "planner" => "revising plan".to_string(),
            "review" => "reviewing revision".to_string(),
            _ => "finalizing revision".to_string(),
        }
    }
}

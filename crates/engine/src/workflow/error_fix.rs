// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-resolution workflow: implement → review → finalize.
//!
//! A focused variant of task implementation: the input is a structured error
//! list (with optional related task ids held under shared occupancy).

use std::collections::BTreeSet;

use apc_core::{OccupancyMode, SignalResult, Stage, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::phase_ctx::{AgentDisposition, PhaseContext};
use super::{prompts, PhaseOutcome, WorkflowError, WorkflowSpec};

const PHASES: &[&str] = &["implement", "review", "finalize"];

/// One structured error to resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorItem {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Input for an error-resolution workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResolutionInput {
    pub errors: Vec<ErrorItem>,
}

pub struct ErrorResolutionWorkflow {
    input: ErrorResolutionInput,
    review_cap: u32,
    review_rounds: u32,
    reviewer_feedback: Option<String>,
}

impl ErrorResolutionWorkflow {
    pub fn new(input: ErrorResolutionInput, review_cap: u32) -> Self {
        Self { input, review_cap, review_rounds: 0, reviewer_feedback: None }
    }

    fn related_tasks(&self) -> Vec<TaskId> {
        let tasks: BTreeSet<TaskId> =
            self.input.errors.iter().filter_map(|e| e.task_id).collect();
        tasks.into_iter().collect()
    }

    async fn run_implement(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let related = self.related_tasks();
        if !related.is_empty() {
            ctx.declare_occupancy(&related, OccupancyMode::Shared, "resolving errors")?;
        }

        let mut prompt = prompts::error_fix_prompt(&self.input.errors);
        if let Some(feedback) = self.reviewer_feedback.take() {
            prompt.push_str("\nReviewer feedback to address:\n");
            prompt.push_str(&feedback);
            prompt.push('\n');
        }
        let signal = ctx
            .run_agent(
                "implementer",
                Stage::ErrorAnalysis,
                None,
                prompt,
                AgentDisposition::Release,
            )
            .await?;
        if signal.result != SignalResult::Complete {
            return Err(WorkflowError::Permanent("error resolution incomplete".to_string()));
        }
        ctx.record_files(signal.payload_files());
        Ok(PhaseOutcome::Advance)
    }

    async fn run_review(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        self.review_rounds += 1;
        let files = ctx.files_modified();
        let prompt = format!(
            "Review the error fixes in:\n{}\
             Confirm each reported error is resolved. Report approved or\n\
             changes_requested with feedback.\n",
            files
                .iter()
                .map(|f| format!("  - {}\n", f.display()))
                .collect::<String>(),
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
                Ok(PhaseOutcome::Rewind { to: 0 })
            }
            _ => {
                ctx.log(&format!(
                    "review cap reached after {} rounds, accepting fixes as-is",
                    self.review_rounds
                ));
                Ok(PhaseOutcome::Advance)
            }
        }
    }

    async fn run_finalize(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let related = self.related_tasks();
        if !related.is_empty() {
            ctx.release_occupancy(Some(&related));
        }
        ctx.log(&format!("resolved {} errors", self.input.errors.len()));
        Ok(PhaseOutcome::Advance)
    }
}

#[async_trait]
impl WorkflowSpec for ErrorResolutionWorkflow {
    fn kind(&self) -> &'static str {
        "error_resolution"
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
            0 => self.run_implement(ctx).await,
            1 => self.run_review(ctx).await,
            _ => self.run_finalize(ctx).await,
        }
    }

    fn output(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "errorCount": self.input.errors.len(),
            "reviewRounds": self.review_rounds,
        }))
    }
}

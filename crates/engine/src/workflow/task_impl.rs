// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-implementation workflow:
//! implement → review → approval → delta_context → pipeline → finalize.
//!
//! Holds exclusive occupancy of its task from the first phase until
//! finalize. Review may loop back to implement up to a cap; when the cap is
//! reached without approval the workflow proceeds anyway and the external
//! pipeline remains the downstream gate.

use apc_core::{OccupancyMode, SignalResult, Stage, TaskId, TaskStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::phase_ctx::{AgentDisposition, PhaseContext};
use super::{prompts, PhaseOutcome, WorkflowError, WorkflowSpec};

const PHASES: &[&str] =
    &["implement", "review", "approval", "delta_context", "pipeline", "finalize"];

/// Input for a task-implementation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskImplInput {
    pub task_id: TaskId,
}

pub struct TaskImplWorkflow {
    task_id: TaskId,
    review_cap: u32,
    review_rounds: u32,
    approved: bool,
    reviewer_feedback: Option<String>,
}

impl TaskImplWorkflow {
    pub fn new(input: TaskImplInput, review_cap: u32) -> Self {
        Self {
            task_id: input.task_id,
            review_cap,
            review_rounds: 0,
            approved: false,
            reviewer_feedback: None,
        }
    }

    fn task(&self, ctx: &PhaseContext) -> Result<apc_core::Task, WorkflowError> {
        ctx.services
            .tasks
            .get(self.task_id)
            .ok_or_else(|| WorkflowError::Permanent(format!("task {} not in registry", self.task_id)))
    }

    async fn run_implement(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        // First entry (and every re-entry after pause) holds the task
        ctx.declare_occupancy(
            &[self.task_id],
            OccupancyMode::Exclusive,
            "implementing task",
        )?;
        let task = self.task(ctx)?;
        if task.status != TaskStatus::InProgress {
            let _ = ctx
                .services
                .tasks
                .mark_status(self.task_id, TaskStatus::InProgress, None);
        }

        let prompt = prompts::implement_prompt(
            self.task_id,
            &task.description,
            self.reviewer_feedback.as_deref(),
        );
        self.reviewer_feedback = None;

        let signal = ctx
            .run_agent(
                "implementer",
                Stage::Implementation,
                Some(self.task_id),
                prompt,
                AgentDisposition::Release,
            )
            .await?;
        if signal.result != SignalResult::Success {
            return Err(WorkflowError::Permanent(format!(
                "implementation of {} failed",
                self.task_id
            )));
        }
        ctx.record_files(signal.payload_files());
        Ok(PhaseOutcome::Advance)
    }

    async fn run_review(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        self.review_rounds += 1;
        let prompt = prompts::review_prompt(self.task_id, &ctx.files_modified());
        let signal = ctx
            .run_agent(
                "reviewer",
                Stage::Review,
                Some(self.task_id),
                prompt,
                AgentDisposition::Release,
            )
            .await?;
        match signal.result {
            SignalResult::Approved => {
                self.approved = true;
                Ok(PhaseOutcome::Advance)
            }
            _ if self.review_rounds < self.review_cap => {
                self.reviewer_feedback = signal
                    .payload
                    .get("feedback")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                ctx.log(&format!(
                    "review round {} requested changes",
                    self.review_rounds
                ));
                Ok(PhaseOutcome::Rewind { to: 0 })
            }
            _ => Ok(PhaseOutcome::Advance),
        }
    }

    /// Bookkeeping phase: record whether review approved, or that the cap
    /// was exhausted and the pipeline is the remaining gate.
    async fn run_approval(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        if self.approved {
            ctx.log(&format!("task {} approved by review", self.task_id));
        } else {
            ctx.log(&format!(
                "task {} proceeding without approval after {} review rounds",
                self.task_id, self.review_rounds
            ));
        }
        Ok(PhaseOutcome::Advance)
    }

    async fn run_delta_context(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        let prompt = prompts::delta_context_prompt(self.task_id, &ctx.files_modified());
        let signal = ctx
            .run_agent(
                "context",
                Stage::DeltaContext,
                Some(self.task_id),
                prompt,
                AgentDisposition::Release,
            )
            .await?;
        if signal.result != SignalResult::Success {
            // A missing delta brief degrades later prompts, nothing more
            ctx.log("delta context failed, continuing without it");
        }
        Ok(PhaseOutcome::Advance)
    }

    /// Queue into the external pipeline when the task carries a pipeline
    /// config; the pipeline itself is an external collaborator.
    async fn run_pipeline(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        match self.task(ctx)?.pipeline {
            Some(pipeline) => {
                ctx.log(&format!(
                    "queued task {} into pipeline {}",
                    self.task_id, pipeline.name
                ));
            }
            None => ctx.log("no pipeline configured, skipping"),
        }
        Ok(PhaseOutcome::Advance)
    }

    async fn run_finalize(&mut self, ctx: &PhaseContext) -> Result<PhaseOutcome, WorkflowError> {
        ctx.services
            .tasks
            .mark_status(self.task_id, TaskStatus::Completed, None)
            .map_err(|e| WorkflowError::Permanent(e.to_string()))?;
        ctx.release_occupancy(Some(&[self.task_id]));
        Ok(PhaseOutcome::Advance)
    }
}

#[async_trait]
impl WorkflowSpec for TaskImplWorkflow {
    fn kind(&self) -> &'static str {
        "task_implementation"
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
            2 => self.run_approval(ctx).await,
            3 => self.run_delta_context(ctx).await,
            4 => self.run_pipeline(ctx).await,
            _ => self.run_finalize(ctx).await,
        }
    }

    fn output(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "taskId": self.task_id.as_str(),
            "approved": self.approved,
            "reviewRounds": self.review_rounds,
        }))
    }

    fn progress_message(&self, phase: &str) -> String {
        format!("{phase} for {}", self.task_id)
    }

    async fn on_failure(&mut self, ctx: &PhaseContext) {
        let _ = ctx.services.tasks.mark_status(
            self.task_id,
            TaskStatus::Failed,
            Some("implementation workflow failed"),
        );
    }

    async fn on_cancel(&mut self, ctx: &PhaseContext) {
        // Return the task to the pending set so a later execution restart
        // can dispatch it again.
        if let Some(task) = ctx.services.tasks.get(self.task_id) {
            if task.status == TaskStatus::InProgress {
                let _ = ctx
                    .services
                    .tasks
                    .mark_status(self.task_id, TaskStatus::Pending, Some("workflow cancelled"));
            }
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context-gathering workflow: a single data-producing phase that writes a
//! context brief to a known path.

use apc_core::{SignalResult, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::phase_ctx::{AgentDisposition, PhaseContext};
use super::{prompts, PhaseOutcome, WorkflowError, WorkflowSpec};

const PHASES: &[&str] = &["context"];

/// Input for a context-gathering workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextGatherInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

pub struct ContextGatherWorkflow {
    input: ContextGatherInput,
    brief_path: Option<std::path::PathBuf>,
}

impl ContextGatherWorkflow {
    pub fn new(input: ContextGatherInput) -> Self {
        Self { input, brief_path: None }
    }
}

#[async_trait]
impl WorkflowSpec for ContextGatherWorkflow {
    fn kind(&self) -> &'static str {
        "context_gathering"
    }

    fn phases(&self) -> &'static [&'static str] {
        PHASES
    }

    async fn execute_phase(
        &mut self,
        _index: usize,
        ctx: &PhaseContext,
    ) -> Result<PhaseOutcome, WorkflowError> {
        let brief_path = ctx.services.persist.context_brief_path(ctx.session_id());
        let prompt = prompts::context_prompt(self.input.focus.as_deref(), &brief_path);
        let signal = ctx
            .run_agent("context", Stage::Context, None, prompt, AgentDisposition::Release)
            .await?;
        if signal.result != SignalResult::Success {
            return Err(WorkflowError::Permanent("context gathering failed".to_string()));
        }
        self.brief_path = Some(brief_path);
        Ok(PhaseOutcome::Advance)
    }

    fn output(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "contextPath": self.brief_path.as_ref().map(|p| p.display().to_string()),
        }))
    }

    fn progress_message(&self, _phase: &str) -> String {
        "gathering context".to_string()
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt construction helpers shared by the workflow types.
//!
//! Every agent prompt ends with the completion-instruction block: the agent
//! must invoke `apc agent complete` with the ids it was given, which is what
//! delivers the completion signal the dispatching phase is waiting on.

use apc_core::{SessionId, Stage, TaskId, WorkflowId};

/// Result codes an agent may report for a stage, for the instruction text.
fn result_codes(stage: Stage) -> &'static str {
    match stage {
        Stage::Review => "approved | changes_requested",
        Stage::Analysis => "pass | critical | minor",
        Stage::ErrorAnalysis => "complete",
        _ => "success | failed",
    }
}

/// The required trailing instruction block for every agent prompt.
pub fn completion_instructions(
    session: SessionId,
    workflow: WorkflowId,
    stage: Stage,
    task: Option<TaskId>,
) -> String {
    let task_arg = task
        .map(|t| format!(" \\\n    --task {t}"))
        .unwrap_or_default();
    format!(
        "\n\n---\n\
         When you are done, you MUST report your result by running:\n\n\
         apc agent complete \\\n    \
         --session {session} \\\n    \
         --workflow {workflow} \\\n    \
         --stage {stage}{task_arg} \\\n    \
         --result <{codes}> \\\n    \
         --data '<JSON payload>'\n\n\
         The payload is stage-specific JSON (e.g. {{\"files\": [...], \"feedback\": \"...\"}}).\n\
         If the command fails, retry it up to 3 times with a 2 second pause.\n\
         Do not exit before the command succeeds.\n",
        codes = result_codes(stage),
    )
}

/// Planner prompt for a fresh plan.
pub fn planner_prompt(requirement: &str, plan_path: &std::path::Path, feedback: &[String]) -> String {
    let mut prompt = format!(
        "You are the planner. Produce an implementation plan for the requirement\n\
         below and write it to {path}.\n\n\
         Requirement:\n{requirement}\n\n\
         Express every task as a checklist line:\n\
         - [ ] <taskId>: <description> (deps: <ids>) (files: <paths>)\n\
         Task ids must use the session prefix you were given, numbered _T1, _T2, ...\n",
        path = plan_path.display(),
    );
    if !feedback.is_empty() {
        prompt.push_str("\nAddress the analyst feedback from the previous round:\n");
        for item in feedback {
            prompt.push_str("  - ");
            prompt.push_str(item);
            prompt.push('\n');
        }
    }
    prompt
}

/// Analyst prompt reviewing the current plan.
pub fn analyst_prompt(plan_path: &std::path::Path, perspective: &str) -> String {
    format!(
        "You are a plan analyst focused on {perspective}. Review the plan at\n\
         {path} and report pass, critical, or minor. Include structured issue\n\
         and suggestion lists in your payload.\n",
        path = plan_path.display(),
    )
}

/// Revision planner prompt.
pub fn revision_prompt(
    instruction: &str,
    plan_path: &std::path::Path,
    affected: &str,
) -> String {
    format!(
        "You are the planner. Revise the existing plan at {path} according to\n\
         the instruction below, changing only what the instruction requires.\n\
         Affected tasks: {affected}.\n\n\
         Instruction:\n{instruction}\n",
        path = plan_path.display(),
    )
}

/// Implementation prompt for one task.
pub fn implement_prompt(task_id: TaskId, description: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "You are the implementer for task {task_id}.\n\n\
         Task description:\n{description}\n\n\
         Implement the task completely, including tests. List every file you\n\
         modify in the `files` array of your completion payload.\n"
    );
    if let Some(feedback) = feedback {
        prompt.push_str("\nReviewer feedback to address:\n");
        prompt.push_str(feedback);
        prompt.push('\n');
    }
    prompt
}

/// Review prompt for one task's implementation.
pub fn review_prompt(task_id: TaskId, files: &[std::path::PathBuf]) -> String {
    let list = if files.is_empty() {
        "  (no files reported)\n".to_string()
    } else {
        files
            .iter()
            .map(|f| format!("  - {}\n", f.display()))
            .collect()
    };
    format!(
        "You are the reviewer for task {task_id}. Review the changes in:\n\
         {list}\
         Report approved or changes_requested, with feedback in the payload.\n"
    )
}

/// Delta-context prompt after a task lands.
pub fn delta_context_prompt(task_id: TaskId, files: &[std::path::PathBuf]) -> String {
    let list: String = files
        .iter()
        .map(|f| format!("  - {}\n", f.display()))
        .collect();
    format!(
        "Summarize what changed for task {task_id} so later tasks can build\n\
         on it. Files touched:\n{list}"
    )
}

/// Error-resolution prompt.
pub fn error_fix_prompt(errors: &[super::error_fix::ErrorItem]) -> String {
    let mut prompt = String::from(
        "You are resolving the following errors. Fix each one and report\n\
         complete when done, listing modified files in the payload.\n\nErrors:\n",
    );
    for error in errors {
        prompt.push_str("  - ");
        prompt.push_str(&error.message);
        if let Some(file) = &error.file {
            prompt.push_str(&format!(" (in {file})"));
        }
        prompt.push('\n');
    }
    prompt
}

/// Context-gathering prompt.
pub fn context_prompt(focus: Option<&str>, brief_path: &std::path::Path) -> String {
    let focus = focus.unwrap_or("the overall project structure and conventions");
    format!(
        "Survey the repository and write a context brief about {focus} to\n\
         {path}. Report success when the file is written.\n",
        path = brief_path.display(),
    )
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;

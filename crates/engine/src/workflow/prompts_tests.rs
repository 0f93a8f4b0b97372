// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use apc_core::SignalResult;
use yare::parameterized;

#[test]
fn instruction_block_carries_all_ids() {
    let block = completion_instructions(
        SessionId::from_string("sprompt0001"),
        WorkflowId::from_string("wf--prompt01"),
        Stage::Implementation,
        Some(TaskId::from_string("sprompt0001_T2")),
    );
    assert!(block.contains("apc agent complete"));
    assert!(block.contains("--session sprompt0001"));
    assert!(block.contains("--workflow wf--prompt01"));
    assert!(block.contains("--stage implementation"));
    assert!(block.contains("--task sprompt0001_T2"));
    assert!(block.contains("retry it up to 3 times"));
}

#[test]
fn task_arg_omitted_without_task() {
    let block = completion_instructions(
        SessionId::from_string("sprompt0001"),
        WorkflowId::from_string("wf--prompt01"),
        Stage::Planning,
        None,
    );
    assert!(!block.contains("--task"));
}

#[parameterized(
    review = { Stage::Review, SignalResult::Approved },
    analysis = { Stage::Analysis, SignalResult::Critical },
    error_analysis = { Stage::ErrorAnalysis, SignalResult::Complete },
    implementation = { Stage::Implementation, SignalResult::Success },
)]
fn advertised_codes_are_valid_for_stage(stage: Stage, example: SignalResult) {
    let block = completion_instructions(
        SessionId::from_string("sprompt0001"),
        WorkflowId::from_string("wf--prompt01"),
        stage,
        None,
    );
    assert!(block.contains(&example.to_string()));
    assert!(example.valid_for(stage));
}

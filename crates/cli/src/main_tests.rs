// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::CommandFactory;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn plan_new_joins_requirement_words() {
    let cli = Cli::try_parse_from(["apc", "plan", "new", "build", "a", "parser"]).unwrap();
    match cli.command {
        Command::Plan(PlanCommand::New { requirement }) => {
            assert_eq!(requirement.join(" "), "build a parser");
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn agent_complete_parses_all_flags() {
    let cli = Cli::try_parse_from([
        "apc", "agent", "complete",
        "--session", "sabc1234567",
        "--workflow", "wf--abc",
        "--stage", "implementation",
        "--task", "sabc1234567_T1",
        "--result", "success",
        "--data", r#"{"files":[]}"#,
    ])
    .unwrap();
    match cli.command {
        Command::Agent(AgentCommand::Complete { session, stage, task, result, data, .. }) => {
            assert_eq!(session, "sabc1234567");
            assert_eq!(stage, "implementation");
            assert_eq!(task.as_deref(), Some("sabc1234567_T1"));
            assert_eq!(result, "success");
            assert_eq!(data, r#"{"files":[]}"#);
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn agent_complete_task_and_data_are_optional() {
    let cli = Cli::try_parse_from([
        "apc", "agent", "complete",
        "--session", "s1",
        "--workflow", "wf--1",
        "--stage", "planning",
        "--result", "success",
    ])
    .unwrap();
    match cli.command {
        Command::Agent(AgentCommand::Complete { task, data, .. }) => {
            assert!(task.is_none());
            assert_eq!(data, "null");
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn pool_resize_requires_number() {
    assert!(Cli::try_parse_from(["apc", "pool", "resize", "five"]).is_err());
    assert!(Cli::try_parse_from(["apc", "pool", "resize", "5"]).is_ok());
}

#[test]
fn workflow_retry_takes_session_and_task() {
    let cli = Cli::try_parse_from(["apc", "workflow", "retry", "sabc1234567", "sabc1234567_T3"])
        .unwrap();
    match cli.command {
        Command::Workflow(WorkflowCommand::Retry { session, task }) => {
            assert_eq!(session, "sabc1234567");
            assert_eq!(task, "sabc1234567_T3");
        }
        _ => panic!("wrong command"),
    }
}

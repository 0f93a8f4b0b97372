// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `apc` — thin CLI client for the coordinator daemon.

mod client;
mod exit_error;
mod output;

use std::process::ExitCode;
use std::time::Duration;

use apc_core::{SessionId, TaskId, WorkflowId};
use apc_daemon::Request;
use clap::{Parser, Subcommand};

use exit_error::CliError;

#[derive(Parser)]
#[command(name = "apc", about = "Agentic Planning Coordinator", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Daemon status overview
    Status,
    /// Force a reconciliation pass
    Evaluate,
    /// Stream coordinator events
    Watch,
    /// Planning-session commands
    #[command(subcommand)]
    Plan(PlanCommand),
    /// Execution commands
    #[command(subcommand)]
    Exec(ExecCommand),
    /// Session lifecycle commands
    #[command(subcommand)]
    Session(SessionCommand),
    /// Agent pool commands
    #[command(subcommand)]
    Pool(PoolCommand),
    /// Workflow commands
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// Agent-facing commands (invoked from inside agent subprocesses)
    #[command(subcommand)]
    Agent(AgentCommand),
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Create a session and start planning
    New {
        /// The requirement text
        requirement: Vec<String>,
    },
    /// Approve the reviewed plan
    Approve { session: String },
    /// Revise the plan (blocking)
    Revise {
        session: String,
        instruction: Vec<String>,
    },
    /// Cancel planning
    Cancel { session: String },
    /// Abandon the plan and start planning over
    Restart { session: String },
}

#[derive(Subcommand)]
enum ExecCommand {
    /// Dispatch implementation workflows for the approved plan
    Start { session: String },
    Pause { session: String },
    Resume { session: String },
    Stop { session: String },
    Status { session: String },
}

#[derive(Subcommand)]
enum SessionCommand {
    List,
    Get { session: String },
    Pause { session: String },
    Resume { session: String },
    Stop { session: String },
    Remove { session: String },
}

#[derive(Subcommand)]
enum PoolCommand {
    Status,
    Resize { size: usize },
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// Fresh implementation workflow for a failed task
    Retry { session: String, task: String },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Deliver a completion signal (called by agents, retried on transport
    /// failure)
    Complete {
        #[arg(long)]
        session: String,
        #[arg(long)]
        workflow: String,
        #[arg(long)]
        stage: String,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        result: String,
        /// Stage-specific JSON payload
        #[arg(long, default_value = "null")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    let request = match command {
        Command::Status => Request::Status,
        Command::Evaluate => Request::CoordinatorEvaluate,
        Command::Watch => {
            return client::watch(|event| println!("{}", event.log_summary())).await;
        }
        Command::Plan(plan) => match plan {
            PlanCommand::New { requirement } => {
                Request::PlanCreate { requirement: requirement.join(" ") }
            }
            PlanCommand::Approve { session } => {
                Request::PlanApprove { session: SessionId::from_string(session) }
            }
            PlanCommand::Revise { session, instruction } => Request::PlanRevise {
                session: SessionId::from_string(session),
                instruction: instruction.join(" "),
            },
            PlanCommand::Cancel { session } => {
                Request::PlanCancel { session: SessionId::from_string(session) }
            }
            PlanCommand::Restart { session } => {
                Request::PlanRestart { session: SessionId::from_string(session) }
            }
        },
        Command::Exec(exec) => match exec {
            ExecCommand::Start { session } => {
                Request::ExecStart { session: SessionId::from_string(session) }
            }
            ExecCommand::Pause { session } => {
                Request::ExecPause { session: SessionId::from_string(session) }
            }
            ExecCommand::Resume { session } => {
                Request::ExecResume { session: SessionId::from_string(session) }
            }
            ExecCommand::Stop { session } => {
                Request::ExecStop { session: SessionId::from_string(session) }
            }
            ExecCommand::Status { session } => {
                Request::ExecStatus { session: SessionId::from_string(session) }
            }
        },
        Command::Session(session) => match session {
            SessionCommand::List => Request::SessionList,
            SessionCommand::Get { session } => {
                Request::SessionGet { session: SessionId::from_string(session) }
            }
            SessionCommand::Pause { session } => {
                Request::SessionPause { session: SessionId::from_string(session) }
            }
            SessionCommand::Resume { session } => {
                Request::SessionResume { session: SessionId::from_string(session) }
            }
            SessionCommand::Stop { session } => {
                Request::SessionStop { session: SessionId::from_string(session) }
            }
            SessionCommand::Remove { session } => {
                Request::SessionRemove { session: SessionId::from_string(session) }
            }
        },
        Command::Pool(pool) => match pool {
            PoolCommand::Status => Request::PoolStatus,
            PoolCommand::Resize { size } => Request::PoolResize { size },
        },
        Command::Workflow(workflow) => match workflow {
            WorkflowCommand::Retry { session, task } => Request::WorkflowRetry {
                session: SessionId::from_string(session),
                task: TaskId::from_string(task),
            },
        },
        Command::Agent(AgentCommand::Complete {
            session,
            workflow,
            stage,
            task,
            result,
            data,
        }) => {
            let data: serde_json::Value = serde_json::from_str(&data)
                .map_err(|e| CliError::Domain(format!("--data is not valid JSON: {e}")))?;
            let request = Request::AgentComplete {
                session: SessionId::from_string(session),
                workflow: WorkflowId::from_string(workflow),
                stage,
                task: task.map(TaskId::from_string),
                result,
                data,
            };
            return send_with_retry(request).await;
        }
    };

    let response = client::send(request).await?;
    println!("{}", output::render(&response));
    Ok(())
}

/// Agents call `apc agent complete` from inside subprocesses; a transient
/// transport failure must not lose the signal, so retry up to 3 times with
/// a 2-second backoff.
async fn send_with_retry(request: Request) -> Result<(), CliError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client::send(request.clone()).await {
            Ok(response) => {
                println!("{}", output::render(&response));
                return Ok(());
            }
            Err(e) if e.is_transport() && attempt < 3 => {
                eprintln!("attempt {attempt} failed ({e}), retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

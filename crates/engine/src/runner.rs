// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-runner abstraction.
//!
//! The engine never talks to an LLM directly: it spawns an external agent CLI
//! subprocess with a prompt whose trailing block instructs the agent to call
//! `apc agent complete` with the ids it was given. [`ProcessRunner`] is the
//! production implementation; [`FakeRunner`] scripts the whole exchange for
//! tests.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
#[cfg(any(test, feature = "test-support"))]
use std::time::Duration;

use apc_core::{RoleId, SessionId, Stage, TaskId, WorkflowId};
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;

/// Errors from spawning or supervising an agent subprocess.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn agent command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("agent i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("agent already reaped")]
    AlreadyReaped,
}

/// Everything an agent subprocess needs for one phase run.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Correlation id for logs
    pub invocation_id: String,
    /// Pool agent name executing this prompt
    pub agent: String,
    pub role: RoleId,
    pub session_id: SessionId,
    pub workflow_id: WorkflowId,
    pub stage: Stage,
    pub task_id: Option<TaskId>,
    pub prompt: String,
    pub cwd: PathBuf,
    /// Per-agent log file (`logs/agents/{workflow}_{agent}.log`)
    pub log_path: PathBuf,
}

impl AgentInvocation {
    pub fn new(
        agent: impl Into<String>,
        role: RoleId,
        session_id: SessionId,
        workflow_id: WorkflowId,
        stage: Stage,
    ) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            agent: agent.into(),
            role,
            session_id,
            workflow_id,
            stage,
            task_id: None,
            prompt: String::new(),
            cwd: PathBuf::from("."),
            log_path: PathBuf::new(),
        }
    }

    apc_core::setters! {
        into {
            prompt: String,
            cwd: PathBuf,
            log_path: PathBuf,
        }
        option {
            task_id: TaskId,
        }
    }
}

/// How an agent subprocess ended.
#[derive(Debug, Clone)]
pub struct AgentExit {
    pub code: Option<i32>,
    /// Tail of combined output, for continuation extraction
    pub output_tail: String,
}

/// Handle to one running agent subprocess.
#[async_trait]
pub trait AgentHandle: Send {
    /// Wait for the subprocess to exit.
    async fn wait(&mut self) -> Result<AgentExit, RunnerError>;

    /// Best-effort kill. Returns the output captured so far.
    async fn kill(&mut self) -> Result<String, RunnerError>;
}

/// Spawns and supervises external agent subprocesses.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn spawn(&self, invocation: AgentInvocation) -> Result<Box<dyn AgentHandle>, RunnerError>;
}

/// Keep only the last `TAIL_CAP` bytes of output for continuation extraction.
const TAIL_CAP: usize = 64 * 1024;

/// Production runner: executes the configured agent command with the prompt
/// on stdin and the invocation ids in the environment.
pub struct ProcessRunner {
    /// Program to execute (e.g. an agent CLI wrapper script)
    command: String,
    args: Vec<String>,
}

impl ProcessRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self { command: command.into(), args }
    }
}

#[async_trait]
impl AgentRunner for ProcessRunner {
    async fn spawn(&self, invocation: AgentInvocation) -> Result<Box<dyn AgentHandle>, RunnerError> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&invocation.cwd)
            .env("APC_INVOCATION", &invocation.invocation_id)
            .env("APC_AGENT", &invocation.agent)
            .env("APC_ROLE", invocation.role.as_str())
            .env("APC_SESSION", invocation.session_id.as_str())
            .env("APC_WORKFLOW", invocation.workflow_id.as_str())
            .env("APC_STAGE", invocation.stage.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(task) = invocation.task_id {
            cmd.env("APC_TASK", task.as_str());
        }

        let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = invocation.prompt.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    tracing::warn!(error = %e, "failed to write prompt to agent stdin");
                }
            });
        }

        let tail = Arc::new(parking_lot::Mutex::new(String::new()));
        if let Some(stdout) = child.stdout.take() {
            spawn_capture(stdout, invocation.log_path.clone(), Arc::clone(&tail));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_capture(stderr, invocation.log_path.clone(), Arc::clone(&tail));
        }

        tracing::info!(
            invocation = %invocation.invocation_id,
            agent = %invocation.agent,
            workflow = %invocation.workflow_id,
            stage = %invocation.stage,
            "spawned agent subprocess"
        );

        Ok(Box::new(ProcessHandle { child, tail }))
    }
}

/// Stream subprocess output into the per-agent log file and a bounded tail.
fn spawn_capture(
    mut reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    log_path: PathBuf,
    tail: Arc<parking_lot::Mutex<String>>,
) {
    tokio::spawn(async move {
        let mut log = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!(path = %log_path.display(), error = %e, "agent log unavailable");
                None
            }
        };
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Some(log) = log.as_mut() {
                        let _ = log.write_all(&buf[..n]).await;
                    }
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let mut tail = tail.lock();
                    tail.push_str(&chunk);
                    if tail.len() > TAIL_CAP {
                        let cut = tail.len() - TAIL_CAP;
                        tail.drain(..cut);
                    }
                }
            }
        }
    });
}

struct ProcessHandle {
    child: Child,
    tail: Arc<parking_lot::Mutex<String>>,
}

#[async_trait]
impl AgentHandle for ProcessHandle {
    async fn wait(&mut self) -> Result<AgentExit, RunnerError> {
        let status = self.child.wait().await?;
        Ok(AgentExit { code: status.code(), output_tail: self.tail.lock().clone() })
    }

    async fn kill(&mut self) -> Result<String, RunnerError> {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(error = %e, "agent kill failed");
        }
        let _ = self.child.wait().await;
        Ok(self.tail.lock().clone())
    }
}

// --- test support ---------------------------------------------------------

/// Scripted behavior for one [`FakeRunner`] spawn.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeBehavior {
    /// Signal delivered before exit: (result, payload). None = exit silently.
    pub signal: Option<(apc_core::SignalResult, serde_json::Value)>,
    pub exit_code: i32,
    /// Delay before signalling/exiting
    pub delay: Duration,
    /// Output tail returned by wait/kill
    pub output: String,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            signal: Some((apc_core::SignalResult::Success, serde_json::Value::Null)),
            exit_code: 0,
            delay: Duration::from_millis(1),
            output: String::new(),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
type BehaviorFn = dyn Fn(&AgentInvocation) -> FakeBehavior + Send + Sync;

/// Runner that scripts the agent exchange: delivers the configured signal to
/// the signal bus, then exits with the configured code.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeRunner {
    signals: crate::signal_bus::SignalBus,
    clock: crate::services::SharedClock,
    behavior: Arc<BehaviorFn>,
    invocations: Arc<parking_lot::Mutex<Vec<AgentInvocation>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeRunner {
    pub fn new(signals: crate::signal_bus::SignalBus, clock: crate::services::SharedClock) -> Self {
        Self {
            signals,
            clock,
            behavior: Arc::new(|_| FakeBehavior::default()),
            invocations: Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    /// Replace the behavior script.
    pub fn with_behavior(
        mut self,
        behavior: impl Fn(&AgentInvocation) -> FakeBehavior + Send + Sync + 'static,
    ) -> Self {
        self.behavior = Arc::new(behavior);
        self
    }

    /// Every invocation spawned so far.
    pub fn invocations(&self) -> Vec<AgentInvocation> {
        self.invocations.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl AgentRunner for FakeRunner {
    async fn spawn(&self, invocation: AgentInvocation) -> Result<Box<dyn AgentHandle>, RunnerError> {
        use apc_core::Clock;

        self.invocations.lock().push(invocation.clone());
        let behavior = (self.behavior)(&invocation);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let signals = self.signals.clone();
        let now_ms = self.clock.epoch_ms();
        let script = behavior.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(script.delay).await;
            if let Some((result, payload)) = script.signal {
                let signal = apc_core::CompletionSignal {
                    session_id: invocation.session_id,
                    workflow_id: invocation.workflow_id,
                    stage: invocation.stage,
                    task_id: invocation.task_id,
                    result,
                    payload,
                    received_at_ms: now_ms,
                };
                if let Err(e) = signals.deliver(signal) {
                    tracing::warn!(error = %e, "fake agent signal rejected");
                }
            }
            let _ = done_tx.send(());
        });

        Ok(Box::new(FakeHandle {
            done: Some(done_rx),
            task,
            exit_code: behavior.exit_code,
            output: behavior.output,
        }))
    }
}

#[cfg(any(test, feature = "test-support"))]
struct FakeHandle {
    done: Option<tokio::sync::oneshot::Receiver<()>>,
    task: tokio::task::JoinHandle<()>,
    exit_code: i32,
    output: String,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl AgentHandle for FakeHandle {
    async fn wait(&mut self) -> Result<AgentExit, RunnerError> {
        let done = self.done.take().ok_or(RunnerError::AlreadyReaped)?;
        let _ = done.await;
        Ok(AgentExit { code: Some(self.exit_code), output_tail: self.output.clone() })
    }

    async fn kill(&mut self) -> Result<String, RunnerError> {
        self.task.abort();
        Ok(self.output.clone())
    }
}

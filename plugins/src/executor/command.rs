use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use strata_core::context::ContextSlice;
use strata_core::executor::{ExecutionOutcome, TaskExecutor};
use strata_core::plan::Task;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of one shell invocation
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout
    pub fn tail(&self) -> Option<String> {
        let last = |s: &str| {
            s.lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        last(&self.stderr).or_else(|| last(&self.stdout))
    }
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run `command` through the platform shell with `input` on stdin.
pub(crate) async fn run_shell(command: &str, task_id: &str, input: &[u8]) -> Result<ShellOutput> {
    let mut child = shell(command)
        .env("STRATA_TASK_ID", task_id)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn `{command}`"))?;

    // Feed stdin from its own task while stdout/stderr are drained below, so a
    // child that answers before reading everything cannot fill the pipe and stall.
    let writer = child.stdin.take().map(|mut stdin| {
        let payload = input.to_vec();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            // A command that ignores stdin may close it early.
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!(task_id = %task_id, error = %e, "stdin closed before payload was written");
            }
        })
    });

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("Failed to wait for `{command}`"))?;

    if let Some(writer) = writer {
        if let Err(e) = writer.await {
            tracing::debug!(task_id, error = %e, "stdin writer task failed");
        }
    }

    Ok(ShellOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[derive(Serialize)]
struct ExecutePayload<'a> {
    task: &'a Task,
    context: &'a ContextSlice,
}

/// Runs a shell command once per task.
///
/// The command receives `{"task": .., "context": ..}` on stdin and
/// `STRATA_TASK_ID` in its environment. If stdout holds an
/// [`ExecutionOutcome`] JSON object (whole output or its last line) that is
/// the result; otherwise the exit status decides.
pub struct CommandExecutor {
    command: String,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    fn name(&self) -> &str {
        "command"
    }

    async fn execute(&self, task: &Task, context: &ContextSlice) -> Result<ExecutionOutcome> {
        let payload = serde_json::to_vec(&ExecutePayload { task, context })
            .context("Failed to serialize task payload")?;

        tracing::debug!(task_id = %task.id, command = %self.command, "spawning executor command");
        let out = run_shell(&self.command, &task.id, &payload).await?;

        if let Some(outcome) = parse_outcome(&out.stdout) {
            return Ok(outcome);
        }
        if out.success() {
            Ok(ExecutionOutcome::succeeded(Vec::new(), Vec::new()))
        } else {
            let reason = out
                .tail()
                .unwrap_or_else(|| format!("command exited with code {}", out.exit_code));
            Ok(ExecutionOutcome::failed(reason))
        }
    }
}

fn parse_outcome(stdout: &str) -> Option<ExecutionOutcome> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok().or_else(|| {
        trimmed
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| l.starts_with('{'))
            .and_then(|l| serde_json::from_str(l).ok())
    })
}

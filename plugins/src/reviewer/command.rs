use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use strata_core::executor::{ExecutionOutcome, ReviewVerdict, TaskReviewer};
use strata_core::plan::Task;

use crate::executor::command::run_shell;

#[derive(Serialize)]
struct ReviewPayload<'a> {
    task: &'a Task,
    outcome: &'a ExecutionOutcome,
}

/// Reviews through a shell command: exit 0 approves, anything else rejects
/// with the command's last output line as the reason.
pub struct CommandReviewer {
    command: String,
}

impl CommandReviewer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TaskReviewer for CommandReviewer {
    fn name(&self) -> &str {
        "command"
    }

    async fn review(&self, task: &Task, outcome: &ExecutionOutcome) -> Result<ReviewVerdict> {
        let payload = serde_json::to_vec(&ReviewPayload { task, outcome })
            .context("Failed to serialize review payload")?;
        let out = run_shell(&self.command, &task.id, &payload).await?;

        if out.success() {
            return Ok(ReviewVerdict::Approved);
        }
        let reason = out
            .tail()
            .unwrap_or_else(|| format!("reviewer exited with code {}", out.exit_code));
        Ok(ReviewVerdict::rejected(reason))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_code_decides_verdict() {
        let task = Task::new("T1", "t");
        let outcome = ExecutionOutcome::succeeded(vec!["a.sql".into()], vec![]);

        let approve = CommandReviewer::new("cat > /dev/null");
        assert!(approve.review(&task, &outcome).await.unwrap().is_approved());

        let reject = CommandReviewer::new("cat > /dev/null; echo 'missing RLS policy'; exit 1");
        assert_eq!(
            reject.review(&task, &outcome).await.unwrap(),
            ReviewVerdict::rejected("missing RLS policy")
        );
    }
}

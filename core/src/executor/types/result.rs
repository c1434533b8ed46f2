use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::state::SessionStats;

/// What the execution callback reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(files_created: Vec<String>, files_modified: Vec<String>) -> Self {
        Self {
            success: true,
            files_created,
            files_modified,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Created then modified files, as passed on to dependents
    pub fn outputs(&self) -> Vec<String> {
        let mut out = self.files_created.clone();
        for f in &self.files_modified {
            if !out.contains(f) {
                out.push(f.clone());
            }
        }
        out
    }
}

/// Review decision. Anything that is not `Approved` fails the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Rejected { reason: String },
}

impl ReviewVerdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LockTimeout,
    Execution,
    ReviewRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub kind: FailureKind,
    pub message: String,
    /// Lock keys that could not be claimed (lock timeouts only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default)]
    pub waited_ms: u64,
}

impl TaskFailure {
    pub fn execution(task_id: &str, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: FailureKind::Execution,
            message: message.into(),
            resources: Vec::new(),
            waited_ms: 0,
        }
    }

    pub fn rejected(task_id: &str, reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ReviewRejected,
            ..Self::execution(task_id, reason)
        }
    }

    pub fn lock_timeout(task_id: &str, resources: Vec<String>, waited_ms: u64) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: FailureKind::LockTimeout,
            message: format!("lock wait exceeded {waited_ms}ms"),
            resources,
            waited_ms,
        }
    }

    pub fn to_error(&self) -> ExecutorError {
        match self.kind {
            FailureKind::LockTimeout => ExecutorError::LockTimeout {
                task_id: self.task_id.clone(),
                resources: self.resources.clone(),
                waited_ms: self.waited_ms,
            },
            FailureKind::Execution => ExecutorError::TaskExecution {
                task_id: self.task_id.clone(),
                message: self.message.clone(),
            },
            FailureKind::ReviewRejected => ExecutorError::TaskReviewRejected {
                task_id: self.task_id.clone(),
                reason: self.message.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunStatus {
    Completed,
    Failed,
    /// Never dispatched because the layer had already failed
    Skipped,
}

/// Result of a single task in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskRunStatus,
    pub duration_ms: u64,
    pub lock_wait_ms: u64,
    pub outcome: Option<ExecutionOutcome>,
    pub failure: Option<TaskFailure>,
}

impl TaskResult {
    pub fn skipped(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskRunStatus::Skipped,
            duration_ms: 0,
            lock_wait_ms: 0,
            outcome: None,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskRunStatus::Completed
    }

    pub fn is_failure(&self) -> bool {
        self.status == TaskRunStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Outcome of one `execute_plan` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub session_id: String,
    pub plan_id: String,
    pub status: RunStatus,
    /// Layer the run started from when a checkpoint was found
    pub resumed_from: Option<usize>,
    pub layers_executed: Vec<usize>,
    pub failed_layer: Option<usize>,
    /// Tasks completed by this run (not those preloaded from a checkpoint)
    pub completed: Vec<String>,
    pub preloaded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<TaskFailure>,
    pub duration_ms: u64,
    pub stats: SessionStats,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Escalate a failed run into an error: the typed task error when exactly
    /// one task failed, `LayerFailed` otherwise.
    pub fn into_result(self) -> Result<Self, ExecutorError> {
        if self.is_success() {
            return Ok(self);
        }
        match self.failures.as_slice() {
            [single] => Err(single.to_error()),
            failures => Err(ExecutorError::LayerFailed {
                layer: self.failed_layer.unwrap_or_default(),
                failures: failures.iter().map(|f| f.to_error().to_string()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_merge_created_and_modified() {
        let outcome = ExecutionOutcome::succeeded(
            vec!["a.sql".into(), "b.rs".into()],
            vec!["b.rs".into(), "c.rs".into()],
        );
        assert_eq!(outcome.outputs(), vec!["a.sql", "b.rs", "c.rs"]);
    }

    #[test]
    fn test_verdict_wire_format() {
        let v: ReviewVerdict =
            serde_json::from_str(r#"{"verdict": "rejected", "reason": "missing tests"}"#).unwrap();
        assert_eq!(v, ReviewVerdict::rejected("missing tests"));
        assert!(!v.is_approved());
        let ok: ReviewVerdict = serde_json::from_str(r#"{"verdict": "approved"}"#).unwrap();
        assert!(ok.is_approved());
    }

    #[test]
    fn test_failure_maps_to_typed_error() {
        let err = TaskFailure::rejected("t1", "no").to_error();
        assert!(matches!(err, ExecutorError::TaskReviewRejected { .. }));

        let err = TaskFailure::lock_timeout("t2", vec!["table:users".into()], 50).to_error();
        assert!(matches!(err, ExecutorError::LockTimeout { waited_ms: 50, .. }));
    }
}

use thiserror::Error;

use super::code::ErrorCode;

/// Errors raised while building, validating and executing a plan
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Circular dependency detected: {}", format_cycles(.cycles))]
    Cycle { cycles: Vec<Vec<String>> },

    #[error("Plan is stale: built from {expected}, current specification is {actual}")]
    StalePlan { expected: String, actual: String },

    #[error("Invalid plan: {0}")]
    Validation(String),

    #[error(
        "Task '{task_id}' gave up after {waited_ms}ms waiting for locks: {}",
        .resources.join(", ")
    )]
    LockTimeout {
        task_id: String,
        resources: Vec<String>,
        waited_ms: u64,
    },

    #[error("Task '{task_id}' failed: {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("Task '{task_id}' rejected by review: {reason}")]
    TaskReviewRejected { task_id: String, reason: String },

    #[error("Checkpoint I/O failed: {0}")]
    CheckpointIo(String),

    #[error("Layer {layer} failed: {}", .failures.join("; "))]
    LayerFailed { layer: usize, failures: Vec<String> },

    #[error("Runner error: {0}")]
    Runner(String),
}

impl ExecutorError {
    /// Map executor error to protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTaskId(_) => ErrorCode::ValidationError,
            Self::DependencyNotFound { .. } => ErrorCode::DependencyError,
            Self::Cycle { .. } => ErrorCode::CircularDependency,
            Self::StalePlan { .. } => ErrorCode::StalePlan,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::LockTimeout { .. } => ErrorCode::LockTimeout,
            Self::TaskExecution { .. } => ErrorCode::ExecutionFailed,
            Self::TaskReviewRejected { .. } => ErrorCode::ReviewRejected,
            Self::CheckpointIo(_) => ErrorCode::CheckpointIo,
            Self::LayerFailed { .. } => ErrorCode::ExecutionFailed,
            Self::Runner(_) => ErrorCode::GeneralError,
        }
    }

    /// Errors raised before any task runs. The plan must be rebuilt or edited.
    pub fn is_build_time(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTaskId(_)
                | Self::DependencyNotFound { .. }
                | Self::Cycle { .. }
                | Self::StalePlan { .. }
                | Self::Validation(_)
        )
    }

    /// Whether re-invoking the runner later can make progress without editing the plan.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::TaskExecution { .. }
                | Self::TaskReviewRejected { .. }
                | Self::LayerFailed { .. }
        )
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    if cycles.is_empty() {
        return "unable to order remaining tasks".to_string();
    }
    cycles
        .iter()
        .map(|c| c.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

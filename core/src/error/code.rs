/// Stable error codes shared by the event log, renderers and process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ParseError = 2,
    ValidationError = 3,
    StalePlan = 4,
    TaskNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    LockTimeout = 30,
    ExecutionFailed = 40,
    ReviewRejected = 41,
    CheckpointIo = 60,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Short machine-readable name used in JSONL events
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::GeneralError => "general_error",
            Self::ParseError => "parse_error",
            Self::ValidationError => "validation_error",
            Self::StalePlan => "stale_plan",
            Self::TaskNotFound => "task_not_found",
            Self::DependencyError => "dependency_error",
            Self::CircularDependency => "circular_dependency",
            Self::LockTimeout => "lock_timeout",
            Self::ExecutionFailed => "execution_failed",
            Self::ReviewRejected => "review_rejected",
            Self::CheckpointIo => "checkpoint_io",
        }
    }
}

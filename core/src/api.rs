//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `strata_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, state_dir, AppConfig, CheckpointGranularity, ContextConfig, ExecutorConfig,
    LoggingConfig, PluginsConfig, ReviewerKind, StateConfig,
};
pub use crate::context::{
    ContextAssembler, ContextSlice, DependencySummary, EntityExtractor, SchemaCorpus,
    SliceMetrics, VerbEntityExtractor,
};
pub use crate::error::{CliError, ErrorCode, ExecutorError};
pub use crate::executor::{
    executor_fn, reviewer_fn, ExecutionOpts, ExecutionOutcome, ExecutionReport, ExecutionRunner,
    LifecycleEvent, OutputRendererPlugin, RenderEvent, ResourceLockManager, ReviewVerdict,
    RunStatus, TaskExecutor, TaskFailure, TaskResult, TaskReviewer, TaskRunStatus,
};
pub use crate::plan::{
    checksum_file, load_tasks, spec_checksum, DependencyGraph, Plan, PlanBuilder, ResourceKind,
    ResourceRef, ResourceSet, Task, TaskType,
};
pub use crate::state::{
    pending_blockers, status_report, BlockReason, Blocker, Checkpoint, Session, SessionStatus,
    StateEvent, StateManager, StatusReport, TaskStatus,
};

//! Layered plan execution
//!
//! Runs a [`Plan`](crate::plan::Plan) produced by the plan builder:
//! - checksum gate against the current specification
//! - checkpoint resume (completed tasks are never re-run)
//! - layers as barriers, bounded parallelism inside a layer
//! - all-or-nothing resource locks with polling and a timeout
//! - execute → review per task through pluggable callbacks
//!
//! # Architecture
//!
//! ```text
//! Plan { layers }
//!   ↓
//! ExecutionRunner::execute_plan()
//!   ↓  for each layer (barrier)
//! execute_layer_parallel()          Semaphore(max_parallel) + FuturesUnordered
//!   ↓  for each task
//! ready → ResourceLockManager::acquire → executing → TaskExecutor
//!       → reviewing → TaskReviewer → release → completed | failed
//!   ↓
//! StateManager (session snapshot, event log, checkpoint)
//!   ↓
//! ExecutionReport
//! ```

mod engine;
mod locks;
mod output;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use engine::{ExecutionRunner, ExecutionRunnerBuilder};
pub use locks::{HeldResource, LockConflict, ResourceLockManager};
pub use output::{emit_json, emit_warning, LifecycleEvent};
pub use progress::ProgressMonitor;
pub use scheduler::execute_layer_parallel;
pub use traits::{
    executor_fn, reviewer_fn, OutputRendererPlugin, RenderEvent, TaskExecutor, TaskReviewer,
};
pub use types::{
    ExecutionOpts, ExecutionOutcome, ExecutionReport, FailureKind, ReviewVerdict, RunStatus,
    TaskFailure, TaskResult, TaskRunStatus,
};

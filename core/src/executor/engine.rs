use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::CheckpointGranularity;
use crate::context::{ContextAssembler, DependencySummary, SchemaCorpus};
use crate::error::ExecutorError;
use crate::plan::{checksums_match, spec_checksum, Plan, ResourceRef, Task};
use crate::state::{Checkpoint, StateManager, TaskStatus};

use super::locks::ResourceLockManager;
use super::output::{
    emit_execution_plan, emit_layer_end, emit_layer_start, emit_run_end, emit_run_start,
    emit_task_complete, emit_task_start, emit_task_waiting, emit_warning,
};
use super::progress::ProgressMonitor;
use super::scheduler::execute_layer_parallel;
use super::traits::{OutputRendererPlugin, RenderEvent, TaskExecutor, TaskReviewer};
use super::types::{
    ExecutionOpts, ExecutionOutcome, ExecutionReport, ReviewVerdict, RunStatus, TaskFailure,
    TaskResult, TaskRunStatus,
};

/// Drives a plan layer by layer: checksum gate, checkpoint resume, bounded
/// parallel dispatch, lock acquisition, execute → review, and persistence of
/// every transition through the [`StateManager`].
pub struct ExecutionRunner {
    opts: ExecutionOpts,
    state: StateManager,
    locks: Arc<ResourceLockManager>,
    assembler: Arc<ContextAssembler>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
}

pub struct ExecutionRunnerBuilder {
    opts: ExecutionOpts,
    state: StateManager,
    locks: Option<Arc<ResourceLockManager>>,
    assembler: Option<Arc<ContextAssembler>>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
}

impl ExecutionRunner {
    pub fn builder(state: StateManager) -> ExecutionRunnerBuilder {
        ExecutionRunnerBuilder::new(state)
    }

    pub fn opts(&self) -> &ExecutionOpts {
        &self.opts
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn locks(&self) -> &ResourceLockManager {
        &self.locks
    }

    /// Run (or resume) `plan`.
    ///
    /// Build-time problems (stale checksum, malformed plan) and state
    /// persistence failures are returned as `Err`. Task failures end the run
    /// early and are reported in the returned [`ExecutionReport`]; use
    /// [`ExecutionReport::into_result`] to turn them into an error.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        current_spec: &[u8],
        executor: Arc<dyn TaskExecutor>,
        reviewer: Arc<dyn TaskReviewer>,
    ) -> Result<ExecutionReport, ExecutorError> {
        let start = Instant::now();

        plan.verify()?;
        let actual = spec_checksum(current_spec);
        if !checksums_match(&plan.spec_checksum, &actual) {
            tracing::error!(
                plan_id = %plan.plan_id,
                expected = %plan.spec_checksum,
                actual = %actual,
                "plan is stale, rebuild it from the current specification"
            );
            return Err(ExecutorError::StalePlan {
                expected: plan.spec_checksum.clone(),
                actual,
            });
        }

        if let Some(stale) = self.state.detect_interrupted_session()? {
            tracing::warn!(
                session_id = %stale.session_id,
                plan_id = %stale.plan_id,
                "previous session did not finish"
            );
            let stale_id = stale.session_id.clone();
            self.state.abandon_session(stale, "interrupted").await?;
            emit_warning(
                &self.opts,
                &stale_id,
                None,
                "previous session was interrupted; continuing from the last checkpoint",
            );
        }

        let restored = self.state.checkpoints().load(&plan.plan_id)?;
        let preloaded: BTreeSet<String> = restored
            .as_ref()
            .map(|cp| {
                cp.completed_set()
                    .into_iter()
                    .filter(|id| plan.task(id).is_some())
                    .collect()
            })
            .unwrap_or_default();
        let resumed_from = restored.as_ref().map(Checkpoint::next_layer);
        let start_layer = resumed_from.unwrap_or(0);

        let session_id = self
            .state
            .create_session(plan, &preloaded, resumed_from)
            .await?;

        let checkpoint = match restored {
            Some(mut cp) => {
                self.state.restore_checkpoint(&session_id, &cp).await?;
                cp.continue_in(&session_id);
                cp
            }
            None => Checkpoint::new(&plan.plan_id, &session_id),
        };

        let mut summaries: HashMap<String, DependencySummary> = preloaded
            .iter()
            .filter_map(|id| plan.task(id))
            .map(|t| {
                let outputs = checkpoint.task_outputs.get(&t.id).cloned().unwrap_or_default();
                (t.id.clone(), summarize(t, outputs))
            })
            .collect();

        tracing::info!(
            session_id = %session_id,
            plan_id = %plan.plan_id,
            tasks = plan.total_tasks(),
            layers = plan.layers.len(),
            resumed_from = ?resumed_from,
            "execution started"
        );
        self.emit_run_start(&session_id, plan, resumed_from);
        self.emit_plan(&session_id, &plan.layers);

        let progress = Arc::new(Mutex::new(ProgressMonitor::new(
            plan.total_tasks(),
            preloaded.len(),
            self.opts.show_progress(),
        )));

        let ctx = Arc::new(TaskRunContext {
            run_id: session_id.clone(),
            opts: self.opts.clone(),
            state: self.state.clone(),
            locks: self.locks.clone(),
            assembler: self.assembler.clone(),
            renderer: self.renderer.clone(),
            executor,
            reviewer,
            tasks: plan
                .tasks
                .iter()
                .map(|t| (t.id.clone(), t.clone()))
                .collect(),
            progress: progress.clone(),
            checkpoint: tokio::sync::Mutex::new(checkpoint),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let mut outcome = RunTally::default();
        let run = self
            .run_layers(plan, start_layer, &preloaded, &mut summaries, &ctx, &mut outcome)
            .await;

        if let Err(e) = run {
            tracing::error!(session_id = %session_id, error = %e, "execution aborted");
            if let Ok(monitor) = progress.lock() {
                monitor.finish(false);
            }
            for task in &plan.tasks {
                let released = self.locks.release_locks(&task.id);
                if !released.is_empty() {
                    tracing::warn!(task_id = %task.id, count = released.len(), "released locks of aborted task");
                }
            }
            if let Err(persist) = self.state.fail_session(&session_id, e.to_string()).await {
                tracing::warn!(session_id = %session_id, error = %persist, "could not record aborted session");
            }
            return Err(e);
        }

        if let Some(failed_layer) = outcome.failed_layer {
            for layer in plan.layers.iter().skip(failed_layer + 1) {
                outcome
                    .skipped
                    .extend(layer.iter().filter(|id| !preloaded.contains(*id)).cloned());
            }
        }

        let status = if outcome.failed_layer.is_none() {
            self.state.complete_session(&session_id).await?;
            RunStatus::Completed
        } else {
            let summary = outcome
                .failures
                .iter()
                .map(|f| f.to_error().to_string())
                .collect::<Vec<_>>()
                .join("; ");
            self.state.fail_session(&session_id, summary).await?;
            RunStatus::Failed
        };

        if let Ok(monitor) = progress.lock() {
            monitor.finish(status == RunStatus::Completed);
        }

        let stats = self
            .state
            .get_session(&session_id)
            .await?
            .map(|s| s.stats)
            .unwrap_or_default();

        let report = ExecutionReport {
            session_id: session_id.clone(),
            plan_id: plan.plan_id.clone(),
            status,
            resumed_from,
            layers_executed: outcome.layers_executed,
            failed_layer: outcome.failed_layer,
            completed: outcome.completed,
            preloaded: preloaded.into_iter().collect(),
            failed: outcome.failed,
            skipped: outcome.skipped,
            failures: outcome.failures,
            duration_ms: start.elapsed().as_millis() as u64,
            stats,
        };

        tracing::info!(
            session_id = %session_id,
            status = ?report.status,
            completed = report.completed.len(),
            failed = report.failed.len(),
            duration_ms = report.duration_ms,
            "execution finished"
        );
        self.emit_run_end(&session_id, &report);

        Ok(report)
    }

    async fn run_layers(
        &self,
        plan: &Plan,
        start_layer: usize,
        preloaded: &BTreeSet<String>,
        summaries: &mut HashMap<String, DependencySummary>,
        ctx: &Arc<TaskRunContext>,
        tally: &mut RunTally,
    ) -> Result<(), ExecutorError> {
        let run_id = ctx.run_id.as_str();
        let total_layers = plan.layers.len();

        for (layer_idx, layer) in plan.layers.iter().enumerate().skip(start_layer) {
            let pending: Vec<String> = layer
                .iter()
                .filter(|id| !preloaded.contains(*id))
                .cloned()
                .collect();

            if pending.is_empty() {
                // Every task of this layer was already checkpointed.
                let mut cp = ctx.checkpoint.lock().await;
                cp.complete_layer(layer_idx);
                self.state.save_checkpoint(run_id, &cp).await?;
                continue;
            }

            tracing::info!(session_id = run_id, layer = layer_idx, tasks = ?pending, "layer started");
            self.state.start_layer(run_id, layer_idx, &pending).await?;
            self.emit_layer_start(run_id, layer_idx, &pending);

            if let Ok(mut monitor) = ctx.progress.lock() {
                monitor.begin_layer(layer_idx, total_layers, &pending);
            }

            let halted = Arc::new(AtomicBool::new(false));
            let layer_summaries = Arc::new(summaries.clone());
            let task_ctx = ctx.clone();
            let task_halted = halted.clone();
            let executor_fn = move |task_id: String| {
                let ctx = task_ctx.clone();
                let summaries = layer_summaries.clone();
                let halted = task_halted.clone();
                async move { ctx.run_task(&task_id, layer_idx, &summaries, &halted).await }
            };

            let results =
                execute_layer_parallel(&pending, self.opts.max_parallel, halted, executor_fn)
                    .await?;
            tally.layers_executed.push(layer_idx);

            let mut layer_ok = true;
            for id in &pending {
                let Some(result) = results.get(id) else {
                    continue;
                };
                match result.status {
                    TaskRunStatus::Completed => {
                        tally.completed.push(id.clone());
                        if let Some(task) = plan.task(id) {
                            let outputs = result
                                .outcome
                                .as_ref()
                                .map(ExecutionOutcome::outputs)
                                .unwrap_or_default();
                            summaries.insert(id.clone(), summarize(task, outputs));
                        }
                    }
                    TaskRunStatus::Failed => {
                        layer_ok = false;
                        tally.failed.push(id.clone());
                        tally.failures.extend(result.failure.clone());
                    }
                    TaskRunStatus::Skipped => tally.skipped.push(id.clone()),
                }
            }

            if let Ok(mut monitor) = ctx.progress.lock() {
                monitor.end_layer(layer_ok);
            }

            if !layer_ok {
                tally.failed_layer = Some(layer_idx);
                // Completed siblings are kept; the failing layer is not marked done.
                let cp = ctx.checkpoint.lock().await.clone();
                self.state.save_checkpoint(run_id, &cp).await?;
                self.state.complete_layer(run_id, layer_idx, false).await?;
                self.emit_layer_end(run_id, layer_idx, false);
                tracing::error!(
                    session_id = run_id,
                    layer = layer_idx,
                    failed = ?tally.failed,
                    "layer failed, halting"
                );
                break;
            }

            {
                let mut cp = ctx.checkpoint.lock().await;
                cp.complete_layer(layer_idx);
                self.state.save_checkpoint(run_id, &cp).await?;
            }
            self.state.complete_layer(run_id, layer_idx, true).await?;
            self.emit_layer_end(run_id, layer_idx, true);
            tracing::info!(session_id = run_id, layer = layer_idx, "layer completed");
        }

        Ok(())
    }

    fn emit_plan(&self, run_id: &str, layers: &[Vec<String>]) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::Plan {
                run_id: run_id.to_string(),
                layers: layers.to_vec(),
            });
        } else {
            emit_execution_plan(&self.opts, run_id, layers);
        }
    }

    fn emit_run_start(&self, run_id: &str, plan: &Plan, resumed_from: Option<usize>) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::RunStart {
                run_id: run_id.to_string(),
                plan_id: plan.plan_id.clone(),
                total_tasks: plan.total_tasks(),
                total_layers: plan.layers.len(),
                resumed_from,
            });
        } else {
            emit_run_start(
                &self.opts,
                run_id,
                plan.total_tasks(),
                plan.layers.len(),
                resumed_from,
            );
        }
    }

    fn emit_run_end(&self, run_id: &str, report: &ExecutionReport) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::RunEnd {
                run_id: run_id.to_string(),
                report: report.clone(),
            });
        } else {
            emit_run_end(&self.opts, run_id, report);
        }
    }

    fn emit_layer_start(&self, run_id: &str, layer: usize, task_ids: &[String]) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::LayerStart {
                run_id: run_id.to_string(),
                layer,
                task_ids: task_ids.to_vec(),
            });
        } else {
            emit_layer_start(&self.opts, run_id, layer, task_ids);
        }
    }

    fn emit_layer_end(&self, run_id: &str, layer: usize, success: bool) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::LayerEnd {
                run_id: run_id.to_string(),
                layer,
                success,
            });
        } else {
            emit_layer_end(&self.opts, run_id, layer, success);
        }
    }
}

impl ExecutionRunnerBuilder {
    pub fn new(state: StateManager) -> Self {
        Self {
            opts: ExecutionOpts::default(),
            state,
            locks: None,
            assembler: None,
            renderer: None,
        }
    }

    pub fn opts(mut self, opts: ExecutionOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Share a lock table with other runners in the same process
    pub fn locks(mut self, locks: Arc<ResourceLockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn assembler(mut self, assembler: Arc<ContextAssembler>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn OutputRendererPlugin>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> ExecutionRunner {
        ExecutionRunner {
            opts: self.opts,
            state: self.state,
            locks: self.locks.unwrap_or_default(),
            assembler: self.assembler.unwrap_or_else(|| {
                Arc::new(ContextAssembler::new(Arc::new(SchemaCorpus::default())))
            }),
            renderer: self.renderer,
        }
    }
}

#[derive(Default)]
struct RunTally {
    layers_executed: Vec<usize>,
    failed_layer: Option<usize>,
    completed: Vec<String>,
    failed: Vec<String>,
    skipped: Vec<String>,
    failures: Vec<TaskFailure>,
}

/// Everything a single task run needs, shared across the pool
struct TaskRunContext {
    run_id: String,
    opts: ExecutionOpts,
    state: StateManager,
    locks: Arc<ResourceLockManager>,
    assembler: Arc<ContextAssembler>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    executor: Arc<dyn TaskExecutor>,
    reviewer: Arc<dyn TaskReviewer>,
    tasks: HashMap<String, Task>,
    progress: Arc<Mutex<ProgressMonitor>>,
    checkpoint: tokio::sync::Mutex<Checkpoint>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl TaskRunContext {
    async fn run_task(
        &self,
        task_id: &str,
        layer: usize,
        summaries: &HashMap<String, DependencySummary>,
        halted: &AtomicBool,
    ) -> Result<TaskResult, ExecutorError> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| ExecutorError::Runner(format!("Task not found: {}", task_id)))?;
        let started = Instant::now();

        self.state
            .transition_task(&self.run_id, task_id, TaskStatus::Ready)
            .await?;

        let acquired = match self.wait_for_locks(task).await? {
            Ok(acquired) => acquired,
            Err(failure) => {
                tracing::error!(task_id, waited_ms = failure.waited_ms, "lock wait timed out");
                self.state
                    .transition_task(&self.run_id, task_id, TaskStatus::failed(&failure.message))
                    .await?;
                let result = TaskResult {
                    task_id: task_id.to_string(),
                    status: TaskRunStatus::Failed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    lock_wait_ms: failure.waited_ms,
                    outcome: None,
                    failure: Some(failure),
                };
                self.finish(&result);
                return Ok(result);
            }
        };
        let lock_wait_ms = started.elapsed().as_millis() as u64;

        // A sibling failed while we waited: give the locks back untouched.
        if halted.load(Ordering::SeqCst) {
            self.locks.release_locks(task_id);
            self.state
                .transition_task(&self.run_id, task_id, TaskStatus::Pending)
                .await?;
            tracing::debug!(task_id, layer, "layer halted while waiting for locks, not started");
            return Ok(TaskResult::skipped(task_id));
        }

        let work = self.execute_and_review(task, layer, &acquired, summaries).await;

        // Locks are released on every path once acquired.
        let released = self.locks.release_locks(task_id);
        self.state
            .record_lock_released(&self.run_id, task_id, &released)
            .await?;

        let result = match work? {
            Ok(outcome) => {
                self.state
                    .transition_task(&self.run_id, task_id, TaskStatus::Completed)
                    .await?;
                {
                    let mut cp = self.checkpoint.lock().await;
                    cp.record_task(task_id, outcome.outputs());
                    if self.opts.checkpoint == CheckpointGranularity::Task {
                        self.state.save_checkpoint(&self.run_id, &cp).await?;
                    }
                }
                tracing::debug!(task_id, layer, "task completed");
                TaskResult {
                    task_id: task_id.to_string(),
                    status: TaskRunStatus::Completed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    lock_wait_ms,
                    outcome: Some(outcome),
                    failure: None,
                }
            }
            Err(failure) => {
                tracing::error!(task_id, layer, error = %failure.message, "task failed");
                self.state
                    .transition_task(&self.run_id, task_id, TaskStatus::failed(&failure.message))
                    .await?;
                TaskResult {
                    task_id: task_id.to_string(),
                    status: TaskRunStatus::Failed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    lock_wait_ms,
                    outcome: None,
                    failure: Some(failure),
                }
            }
        };

        self.finish(&result);
        Ok(result)
    }

    /// Poll the lock table until every key is ours or `lock_max_wait` elapses.
    async fn wait_for_locks(
        &self,
        task: &Task,
    ) -> Result<Result<Vec<ResourceRef>, TaskFailure>, ExecutorError> {
        let keys = task.resources.lock_keys();
        let started = Instant::now();
        let mut reported = false;

        loop {
            let conflict = match self.locks.acquire(&task.id, &keys) {
                Ok(acquired) => return Ok(Ok(acquired)),
                Err(conflict) => conflict,
            };

            let blocked_on: Vec<String> = conflict.resources().iter().map(ResourceRef::key).collect();
            if !reported {
                reported = true;
                tracing::warn!(task_id = %task.id, %conflict, "waiting for resource locks");
                self.state
                    .record_lock_contention(&self.run_id, &task.id, blocked_on.clone())
                    .await?;
                self.emit_task_waiting(&task.id, &blocked_on);
                if let (Ok(monitor), Some(first)) = (self.progress.lock(), conflict.conflicts.first()) {
                    monitor.waiting(&task.id, &first.holder);
                }
            }

            let waited = started.elapsed();
            if waited >= self.opts.lock_max_wait {
                return Ok(Err(TaskFailure::lock_timeout(
                    &task.id,
                    blocked_on,
                    waited.as_millis() as u64,
                )));
            }
            let remaining = self.opts.lock_max_wait - waited;
            tokio::time::sleep(self.opts.lock_poll_interval.min(remaining)).await;
        }
    }

    async fn execute_and_review(
        &self,
        task: &Task,
        layer: usize,
        acquired: &[ResourceRef],
        summaries: &HashMap<String, DependencySummary>,
    ) -> Result<Result<ExecutionOutcome, TaskFailure>, ExecutorError> {
        self.state
            .record_lock_acquired(&self.run_id, &task.id, acquired)
            .await?;
        self.state
            .transition_task(&self.run_id, &task.id, TaskStatus::Executing)
            .await?;

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.run_callbacks(task, layer, active, summaries).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn run_callbacks(
        &self,
        task: &Task,
        layer: usize,
        active: usize,
        summaries: &HashMap<String, DependencySummary>,
    ) -> Result<Result<ExecutionOutcome, TaskFailure>, ExecutorError> {
        if self.peak.fetch_max(active, Ordering::SeqCst) < active {
            self.state.record_parallelism(&self.run_id, active).await?;
        }
        self.emit_task_start(&task.id, layer);

        let slice = self.assembler.assemble_context_for_task(task, summaries);
        tracing::debug!(
            task_id = %task.id,
            entities = slice.entities.len(),
            reduction_percent = slice.metrics.reduction_percent,
            "context assembled"
        );

        let outcome = match self.executor.execute(task, &slice).await {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => {
                let message = outcome
                    .error
                    .unwrap_or_else(|| "executor reported failure".to_string());
                return Ok(Err(TaskFailure::execution(&task.id, message)));
            }
            Err(e) => return Ok(Err(TaskFailure::execution(&task.id, format!("{e:#}")))),
        };

        self.state
            .transition_task(&self.run_id, &task.id, TaskStatus::Reviewing)
            .await?;

        let verdict = match self.reviewer.review(task, &outcome).await {
            Ok(verdict) => verdict,
            Err(e) => ReviewVerdict::rejected(format!("review failed: {e:#}")),
        };
        self.state
            .record_review(&self.run_id, &task.id, &verdict)
            .await?;

        match verdict {
            ReviewVerdict::Approved => Ok(Ok(outcome)),
            ReviewVerdict::Rejected { reason } => {
                tracing::warn!(task_id = %task.id, reviewer = self.reviewer.name(), %reason, "review rejected");
                Ok(Err(TaskFailure::rejected(&task.id, reason)))
            }
        }
    }

    fn finish(&self, result: &TaskResult) {
        if let Ok(mut monitor) = self.progress.lock() {
            monitor.complete_task(&result.task_id, result.is_success(), result.duration_ms);
        }
        self.emit_task_complete(result);
    }

    fn emit_task_start(&self, task_id: &str, layer: usize) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::TaskStart {
                run_id: self.run_id.clone(),
                task_id: task_id.to_string(),
                layer,
            });
        } else if !self.opts.show_progress() {
            emit_task_start(&self.opts, &self.run_id, task_id, layer);
        }
    }

    fn emit_task_waiting(&self, task_id: &str, blocked_on: &[String]) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::TaskWaiting {
                run_id: self.run_id.clone(),
                task_id: task_id.to_string(),
                blocked_on: blocked_on.to_vec(),
            });
        } else if !self.opts.show_progress() {
            emit_task_waiting(&self.opts, &self.run_id, task_id, blocked_on);
        }
    }

    fn emit_task_complete(&self, result: &TaskResult) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&RenderEvent::TaskComplete {
                run_id: self.run_id.clone(),
                task_id: result.task_id.clone(),
                result: result.clone(),
            });
        } else if !self.opts.show_progress() {
            emit_task_complete(&self.opts, &self.run_id, result);
        }
    }
}

fn summarize(task: &Task, outputs: Vec<String>) -> DependencySummary {
    DependencySummary {
        id: task.id.clone(),
        name: task.display_name().to_string(),
        outputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::traits::{executor_fn, reviewer_fn};
    use std::time::Duration;

    use crate::plan::{PlanBuilder, ResourceKind};
    use crate::state::SessionStatus;

    fn quiet_opts() -> ExecutionOpts {
        let mut opts = ExecutionOpts::default();
        opts.quiet = true;
        opts.progress_bar = false;
        opts
    }

    fn ok_executor() -> Arc<dyn TaskExecutor> {
        executor_fn("ok", |task: Task, _ctx| async move {
            Ok(ExecutionOutcome::succeeded(vec![format!("{}.out", task.id)], vec![]))
        })
    }

    fn approve() -> Arc<dyn TaskReviewer> {
        reviewer_fn("approve", |_t, _o| async { Ok(ReviewVerdict::Approved) })
    }

    #[tokio::test]
    async fn test_simple_plan_completes() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::new(dir.path()).unwrap();
        let plan = PlanBuilder::new("simple")
            .build(
                vec![Task::new("a", "A"), Task::new("b", "B").depends_on(["a"])],
                b"spec",
            )
            .unwrap();

        let runner = ExecutionRunner::builder(state.clone()).opts(quiet_opts()).build();
        let report = runner
            .execute_plan(&plan, b"spec", ok_executor(), approve())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.completed, vec!["a", "b"]);
        assert_eq!(report.layers_executed, vec![0, 1]);
        assert_eq!(report.stats.layers_completed, 2);
        assert_eq!(report.stats.reviews_approved, 2);

        let session = state.load_session(&report.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(runner.locks().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_stale_spec_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::new(dir.path()).unwrap();
        let plan = PlanBuilder::new("stale")
            .build(vec![Task::new("a", "A")], b"v1")
            .unwrap();

        let runner = ExecutionRunner::builder(state.clone()).opts(quiet_opts()).build();
        let err = runner
            .execute_plan(&plan, b"v2", ok_executor(), approve())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::StalePlan { .. }));
        assert!(state.latest_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reviewer_error_counts_as_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::new(dir.path()).unwrap();
        let plan = PlanBuilder::new("rev")
            .build(vec![Task::new("a", "A")], b"spec")
            .unwrap();

        let reviewer = reviewer_fn("broken", |_t, _o| async {
            Err::<ReviewVerdict, _>(anyhow::anyhow!("reviewer crashed"))
        });
        let runner = ExecutionRunner::builder(state).opts(quiet_opts()).build();
        let report = runner
            .execute_plan(&plan, b"spec", ok_executor(), reviewer)
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["a"]);
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, ExecutorError::TaskReviewRejected { .. }));
    }

    #[tokio::test]
    async fn test_aborted_layer_releases_sibling_locks() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::new(dir.path()).unwrap();
        let locks = Arc::new(ResourceLockManager::new());
        let plan = PlanBuilder::new("abort")
            .build(
                vec![
                    Task::new("A", "breaks state").with_tables(["a"]),
                    Task::new("B", "slow").with_tables(["b"]),
                ],
                b"spec",
            )
            .unwrap();

        let sessions = dir.path().join("sessions");
        let executor = executor_fn("sabotage", move |task: Task, _ctx| {
            let sessions = sessions.clone();
            async move {
                if task.id == "A" {
                    // Snapshot writes fail from here on.
                    std::fs::remove_dir_all(&sessions).unwrap();
                    std::fs::write(&sessions, "not a directory").unwrap();
                } else {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                }
                Ok(ExecutionOutcome::succeeded(vec![], vec![]))
            }
        });

        let runner = ExecutionRunner::builder(state)
            .opts(quiet_opts())
            .locks(locks.clone())
            .build();
        let err = runner
            .execute_plan(&plan, b"spec", executor, approve())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::CheckpointIo(_)));
        assert!(locks.snapshot().is_empty(), "leaked: {:?}", locks.snapshot());
    }

    #[tokio::test]
    async fn test_task_acquiring_locks_after_halt_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateManager::new(dir.path()).unwrap();
        let locks = Arc::new(ResourceLockManager::new());
        locks
            .acquire("external", &[ResourceRef::new(ResourceKind::Table, "b")])
            .unwrap();

        let plan = PlanBuilder::new("halt")
            .build(
                vec![
                    Task::new("A", "fails").with_tables(["a"]),
                    Task::new("B", "waits").with_tables(["b"]),
                ],
                b"spec",
            )
            .unwrap();

        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen = calls.clone();
        let executor = executor_fn("record", move |task: Task, _ctx| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(task.id.clone());
                if task.id == "A" {
                    Ok(ExecutionOutcome::failed("boom"))
                } else {
                    Ok(ExecutionOutcome::succeeded(vec![], vec![]))
                }
            }
        });

        let holder = locks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            holder.release_locks("external");
        });

        let opts = quiet_opts().with_lock_timing(Duration::from_millis(10), Duration::from_secs(2));
        let runner = ExecutionRunner::builder(state.clone())
            .opts(opts)
            .locks(locks.clone())
            .build();
        let report = runner
            .execute_plan(&plan, b"spec", executor, approve())
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["A"]);
        assert_eq!(report.failed, vec!["A"]);
        assert_eq!(report.skipped, vec!["B"]);
        assert!(locks.snapshot().is_empty());

        let session = state.load_session(&report.session_id).unwrap().unwrap();
        assert_eq!(session.task_status("B"), Some(&TaskStatus::Pending));
    }
}

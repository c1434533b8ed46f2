use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::error::ExecutorError;

use super::types::TaskResult;

/// Execute one layer of tasks in parallel
///
/// # Arguments
///
/// * `task_ids` - Tasks of this layer still to run
/// * `max_concurrency` - Maximum number of concurrent tasks
/// * `halted` - Set once any task in the layer fails; tasks not yet started are skipped
/// * `executor_fn` - Async function running a single task
///
/// # Returns
///
/// Map of task_id -> TaskResult for every task in `task_ids`. An `Err` from
/// `executor_fn` is fatal: it halts the layer, in-flight siblings still run to
/// completion (so they release their locks), and the first error is returned.
pub async fn execute_layer_parallel<F, Fut>(
    task_ids: &[String],
    max_concurrency: usize,
    halted: Arc<AtomicBool>,
    executor_fn: F,
) -> Result<HashMap<String, TaskResult>, ExecutorError>
where
    F: Fn(String) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<TaskResult, ExecutorError>> + Send,
{
    let sem = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut futs: FuturesUnordered<_> = FuturesUnordered::new();

    for id in task_ids {
        let task_id = id.clone();
        let sem = sem.clone();
        let halted = halted.clone();
        let executor = executor_fn.clone();

        futs.push(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|_| ExecutorError::Runner("semaphore closed unexpectedly".into()))?;

            if halted.load(Ordering::SeqCst) {
                return Ok(TaskResult::skipped(task_id));
            }

            let result = executor(task_id).await;
            // Flag before the permit drops so queued siblings observe it.
            if result.as_ref().map_or(true, TaskResult::is_failure) {
                halted.store(true, Ordering::SeqCst);
            }
            result
        });
    }

    let mut results: HashMap<String, TaskResult> = HashMap::new();
    let mut fatal: Option<ExecutorError> = None;

    // Drain every future: dropping the set would cancel siblings mid-await.
    while let Some(res) = futs.next().await {
        match res {
            Ok(task_result) => {
                results.insert(task_result.task_id.clone(), task_result);
            }
            Err(e) => {
                halted.store(true, Ordering::SeqCst);
                if fatal.is_none() {
                    fatal = Some(e);
                } else {
                    tracing::debug!(error = %e, "further fatal error in aborted layer");
                }
            }
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ContextSlice;
use crate::executor::types::{ExecutionOutcome, ReviewVerdict};
use crate::plan::Task;

/// 任务执行回调（实际完成任务工作）
///
/// 返回 `Err` 或 `success == false` 的结果都视为执行失败。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: &Task, context: &ContextSlice)
        -> anyhow::Result<ExecutionOutcome>;
}

/// 任务评审回调（决定执行结果是否被接受）
///
/// 返回 `Err` 等同于拒绝。
#[async_trait]
pub trait TaskReviewer: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, task: &Task, outcome: &ExecutionOutcome)
        -> anyhow::Result<ReviewVerdict>;
}

/// Closure-backed executor, handy for embedding and tests
pub struct FnExecutor<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(Task, ContextSlice) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ExecutionOutcome>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        task: &Task,
        context: &ContextSlice,
    ) -> anyhow::Result<ExecutionOutcome> {
        (self.f)(task.clone(), context.clone()).await
    }
}

pub fn executor_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn TaskExecutor>
where
    F: Fn(Task, ContextSlice) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ExecutionOutcome>> + Send + 'static,
{
    Arc::new(FnExecutor {
        name: name.into(),
        f,
    })
}

/// Closure-backed reviewer
pub struct FnReviewer<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> TaskReviewer for FnReviewer<F>
where
    F: Fn(Task, ExecutionOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ReviewVerdict>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(
        &self,
        task: &Task,
        outcome: &ExecutionOutcome,
    ) -> anyhow::Result<ReviewVerdict> {
        (self.f)(task.clone(), outcome.clone()).await
    }
}

pub fn reviewer_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn TaskReviewer>
where
    F: Fn(Task, ExecutionOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ReviewVerdict>> + Send + 'static,
{
    Arc::new(FnReviewer {
        name: name.into(),
        f,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_adapters_forward_calls() {
        let exec = executor_fn("echo", |task: Task, _ctx| async move {
            Ok(ExecutionOutcome::succeeded(vec![format!("{}.rs", task.id)], vec![]))
        });
        let review = reviewer_fn("strict", |_task, outcome: ExecutionOutcome| async move {
            if outcome.files_created.is_empty() {
                Ok(ReviewVerdict::rejected("nothing produced"))
            } else {
                Ok(ReviewVerdict::Approved)
            }
        });

        let task = Task::new("t1", "Task one");
        let ctx = ContextSlice::empty(&task.id);
        let outcome = exec.execute(&task, &ctx).await.unwrap();
        assert_eq!(outcome.files_created, vec!["t1.rs"]);
        assert_eq!(exec.name(), "echo");

        let verdict = review.review(&task, &outcome).await.unwrap();
        assert!(verdict.is_approved());
    }
}

use anyhow::Result;
use async_trait::async_trait;
use strata_core::executor::{ExecutionOutcome, ReviewVerdict, TaskReviewer};
use strata_core::plan::Task;

/// Approves every successful outcome
#[derive(Debug, Default)]
pub struct AutoApproveReviewer;

impl AutoApproveReviewer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskReviewer for AutoApproveReviewer {
    fn name(&self) -> &str {
        "auto"
    }

    async fn review(&self, _task: &Task, _outcome: &ExecutionOutcome) -> Result<ReviewVerdict> {
        Ok(ReviewVerdict::Approved)
    }
}

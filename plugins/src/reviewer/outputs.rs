use anyhow::Result;
use async_trait::async_trait;
use strata_core::executor::{ExecutionOutcome, ReviewVerdict, TaskReviewer};
use strata_core::plan::Task;

/// Rejects outcomes that neither created nor modified a file.
#[derive(Debug, Default)]
pub struct OutputsRequiredReviewer;

impl OutputsRequiredReviewer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskReviewer for OutputsRequiredReviewer {
    fn name(&self) -> &str {
        "outputs"
    }

    async fn review(&self, task: &Task, outcome: &ExecutionOutcome) -> Result<ReviewVerdict> {
        if outcome.outputs().is_empty() {
            return Ok(ReviewVerdict::rejected(format!(
                "task '{}' produced no files",
                task.id
            )));
        }
        Ok(ReviewVerdict::Approved)
    }
}

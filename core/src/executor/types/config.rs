use std::time::Duration;

use crate::config::{CheckpointGranularity, ExecutorConfig};

/// Runtime knobs for one `execute_plan` call.
#[derive(Debug, Clone)]
pub struct ExecutionOpts {
    /// Upper bound on concurrently executing tasks within a layer
    pub max_parallel: usize,

    /// Delay between lock acquisition attempts
    pub lock_poll_interval: Duration,

    /// Total time a task may wait for its locks before it fails
    pub lock_max_wait: Duration,

    pub checkpoint: CheckpointGranularity,

    /// Output stream format for fallback lifecycle output: "text" or "jsonl"
    pub stream_format: String,

    /// Draw indicatif progress bars (ignored for jsonl output)
    pub progress_bar: bool,

    pub verbose: bool,

    pub quiet: bool,
}

impl Default for ExecutionOpts {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl ExecutionOpts {
    pub fn from_config(cfg: &ExecutorConfig) -> Self {
        Self {
            max_parallel: cfg.max_parallel.max(1),
            lock_poll_interval: Duration::from_millis(cfg.lock_poll_interval_ms),
            lock_max_wait: Duration::from_millis(cfg.lock_max_wait_ms),
            checkpoint: cfg.checkpoint,
            stream_format: cfg.format.clone(),
            progress_bar: cfg.progress_bar,
            verbose: false,
            quiet: false,
        }
    }

    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.max_parallel = n.max(1);
        self
    }

    pub fn with_lock_timing(mut self, poll: Duration, max_wait: Duration) -> Self {
        self.lock_poll_interval = poll;
        self.lock_max_wait = max_wait;
        self
    }

    pub fn with_checkpoint(mut self, granularity: CheckpointGranularity) -> Self {
        self.checkpoint = granularity;
        self
    }

    /// Progress bars only make sense for interactive text output
    pub fn show_progress(&self) -> bool {
        self.progress_bar && self.stream_format == "text" && !self.quiet
    }
}

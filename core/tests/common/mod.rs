#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use strata_core::context::ContextSlice;
use strata_core::executor::{
    ExecutionOpts, ExecutionOutcome, ExecutionRunner, ReviewVerdict, TaskExecutor, TaskReviewer,
};
use strata_core::plan::{Plan, PlanBuilder, Task};
use strata_core::state::StateManager;

pub const SPEC: &[u8] = b"# feature spec v1\nprofiles, audit log\n";

/// T1 and T2 share a table, T3 depends on T1, T4 on T2 and T3, T5 is independent.
pub fn worked_scenario() -> Vec<Task> {
    vec![
        Task::new("T1", "profiles table").with_tables(["profiles"]),
        Task::new("T2", "profile trigger").with_tables(["profiles"]),
        Task::new("T3", "profile api")
            .with_routes(["/profiles"])
            .depends_on(["T1"]),
        Task::new("T4", "profile page").depends_on(["T2", "T3"]),
        Task::new("T5", "audit log").with_tables(["audit_events"]),
    ]
}

pub fn worked_plan() -> Plan {
    PlanBuilder::new("worked")
        .build(worked_scenario(), SPEC)
        .expect("worked scenario builds")
}

pub fn quiet_opts() -> ExecutionOpts {
    let mut opts = ExecutionOpts::default();
    opts.quiet = true;
    opts.progress_bar = false;
    opts
}

pub fn runner(state_dir: &Path, opts: ExecutionOpts) -> ExecutionRunner {
    let state = StateManager::new(state_dir).expect("state dir");
    ExecutionRunner::builder(state).opts(opts).build()
}

/// Executor recording every call, with optional failures and delay
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub contexts: Arc<Mutex<Vec<ContextSlice>>>,
    pub fail: Arc<Mutex<HashSet<String>>>,
    pub delay: Duration,
    active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self, ids: &[&str]) -> Self {
        self.set_failing(ids);
        self
    }

    pub fn set_failing(&self, ids: &[&str]) {
        let mut fail = self.fail.lock().unwrap();
        fail.clear();
        fail.extend(ids.iter().map(|s| s.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn context_for(&self, task_id: &str) -> Option<ContextSlice> {
        self.contexts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.task_id == task_id)
            .cloned()
    }

    pub fn arc(&self) -> Arc<dyn TaskExecutor> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(
        &self,
        task: &Task,
        context: &ContextSlice,
    ) -> anyhow::Result<ExecutionOutcome> {
        self.calls.lock().unwrap().push(task.id.clone());
        self.contexts.lock().unwrap().push(context.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail.lock().unwrap().contains(&task.id) {
            return Ok(ExecutionOutcome::failed(format!("{} exploded", task.id)));
        }
        Ok(ExecutionOutcome::succeeded(
            vec![format!("src/{}.rs", task.id.to_lowercase())],
            vec![],
        ))
    }
}

/// Reviewer approving everything except the listed tasks
#[derive(Clone, Default)]
pub struct ListReviewer {
    pub reject: HashSet<String>,
}

impl ListReviewer {
    pub fn approve_all() -> Arc<dyn TaskReviewer> {
        Arc::new(Self::default())
    }

    pub fn rejecting(ids: &[&str]) -> Arc<dyn TaskReviewer> {
        Arc::new(Self {
            reject: ids.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl TaskReviewer for ListReviewer {
    fn name(&self) -> &str {
        "list"
    }

    async fn review(
        &self,
        task: &Task,
        _outcome: &ExecutionOutcome,
    ) -> anyhow::Result<ReviewVerdict> {
        if self.reject.contains(&task.id) {
            Ok(ReviewVerdict::rejected(format!("{} does not meet conventions", task.id)))
        } else {
            Ok(ReviewVerdict::Approved)
        }
    }
}

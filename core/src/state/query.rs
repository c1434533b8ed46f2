//! 只读查询：运行进度和阻塞原因

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::session::{Session, SessionStats, SessionStatus};
use super::types::TaskStatus;
use crate::plan::Plan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub session_id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub status: SessionStatus,
    pub current_layer: usize,
    pub total_layers: usize,
    pub total_tasks: usize,
    /// status label -> task count
    pub counts: BTreeMap<String, usize>,
    pub progress_percent: f64,
    pub stats: SessionStats,
    pub error: Option<String>,
}

pub fn status_report(session: &Session, plan: &Plan) -> StatusReport {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for task in &plan.tasks {
        let label = session
            .task_status(&task.id)
            .map(TaskStatus::label)
            .unwrap_or("pending");
        *counts.entry(label.to_string()).or_default() += 1;
    }

    let total = plan.total_tasks();
    let completed = counts.get("completed").copied().unwrap_or(0);
    let progress_percent = if total == 0 {
        100.0
    } else {
        completed as f64 * 100.0 / total as f64
    };

    StatusReport {
        session_id: session.session_id.clone(),
        plan_id: plan.plan_id.clone(),
        plan_name: plan.name.clone(),
        status: session.status,
        current_layer: session.current_layer,
        total_layers: plan.layers.len(),
        total_tasks: total,
        counts,
        progress_percent,
        stats: session.stats.clone(),
        error: session.error.clone(),
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session:  {}", self.session_id)?;
        writeln!(f, "Plan:     {} ({})", self.plan_name, self.plan_id)?;
        writeln!(f, "Status:   {:?}", self.status)?;
        writeln!(
            f,
            "Layer:    {}/{}",
            (self.current_layer + 1).min(self.total_layers.max(1)),
            self.total_layers
        )?;
        writeln!(
            f,
            "Progress: {:.0}% of {} tasks",
            self.progress_percent, self.total_tasks
        )?;
        for (label, n) in &self.counts {
            writeln!(f, "  {label:<10} {n}")?;
        }
        writeln!(
            f,
            "Peak parallelism {}, lock contention {}, reviews {} approved / {} rejected",
            self.stats.peak_parallelism,
            self.stats.lock_contention,
            self.stats.reviews_approved,
            self.stats.reviews_rejected
        )?;
        if let Some(err) = &self.error {
            writeln!(f, "Error:    {err}")?;
        }
        Ok(())
    }
}

/// Why a task has not completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    Failed { error: String },
    WaitingOnDependencies { pending: Vec<String> },
    WaitingOnResource { resource: String, holder: String },
    /// Started but not finished
    InProgress { status: String },
    /// Nothing stands in the way; runs on the next execution
    Runnable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub task_id: String,
    pub layer: Option<usize>,
    #[serde(flatten)]
    pub reason: BlockReason,
}

/// Every non-completed task with the reason it is not done, in layer order.
pub fn pending_blockers(session: &Session, plan: &Plan) -> Vec<Blocker> {
    let is_done = |id: &str| matches!(session.task_status(id), Some(TaskStatus::Completed));

    let mut out = Vec::new();
    for layer in &plan.layers {
        for id in layer {
            if is_done(id) {
                continue;
            }
            let Some(task) = plan.task(id) else {
                continue;
            };

            let status = session.task_status(id).cloned().unwrap_or(TaskStatus::Pending);
            let unmet: Vec<String> = plan
                .all_dependencies(id)
                .into_iter()
                .filter(|d| !is_done(d))
                .collect();
            let held = task.resources.lock_keys().into_iter().find_map(|r| {
                let key = r.key();
                session
                    .locks
                    .get(&key)
                    .filter(|holder| holder.as_str() != id)
                    .map(|holder| (key, holder.clone()))
            });

            let reason = match status {
                TaskStatus::Failed { error } => BlockReason::Failed { error },
                s if s.is_in_flight() => BlockReason::InProgress {
                    status: s.label().to_string(),
                },
                _ if !unmet.is_empty() => BlockReason::WaitingOnDependencies { pending: unmet },
                _ => match held {
                    Some((resource, holder)) => BlockReason::WaitingOnResource { resource, holder },
                    None => BlockReason::Runnable,
                },
            };

            out.push(Blocker {
                task_id: id.clone(),
                layer: plan.layer_of(id),
                reason,
            });
        }
    }
    out
}

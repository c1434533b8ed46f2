//! 会话状态管理

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transitions::{StateTransition, TransitionError};
use super::types::TaskStatus;
use crate::plan::Plan;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// 已创建
    Created,
    /// 运行中
    Running,
    /// 已完成
    Completed,
    /// 已失败
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// 每个任务从开始执行到结束的耗时（毫秒）
    pub task_durations_ms: BTreeMap<String, u64>,
    pub layers_total: usize,
    pub layers_completed: usize,
    /// 同时执行的最大任务数
    pub peak_parallelism: usize,
    /// 资源锁争用次数
    pub lock_contention: u64,
    pub reviews_approved: u64,
    pub reviews_rejected: u64,
}

/// 会话：一次 plan 运行的权威快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 会话唯一 ID
    pub session_id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub spec_checksum: String,
    /// 会话状态
    pub status: SessionStatus,
    /// 当前层
    pub current_layer: usize,
    pub total_layers: usize,
    /// 从检查点恢复时的起始层
    pub resumed_from: Option<usize>,
    pub task_statuses: BTreeMap<String, TaskStatus>,
    /// 锁表：资源键 -> 持有任务
    pub locks: BTreeMap<String, String>,
    pub stats: SessionStats,
    /// 任务开始执行的时间（用于计算耗时）
    #[serde(default)]
    pub task_started_at: BTreeMap<String, DateTime<Utc>>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 完成时间
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Session {
    /// 为 plan 创建新会话；`preloaded` 中的任务直接标记为已完成
    pub fn new(plan: &Plan, preloaded: &BTreeSet<String>, resumed_from: Option<usize>) -> Self {
        let now = Utc::now();
        let task_statuses = plan
            .tasks
            .iter()
            .map(|t| {
                let status = if preloaded.contains(&t.id) {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Pending
                };
                (t.id.clone(), status)
            })
            .collect();

        Self {
            session_id: Uuid::new_v4().to_string(),
            plan_id: plan.plan_id.clone(),
            plan_name: plan.name.clone(),
            spec_checksum: plan.spec_checksum.clone(),
            status: SessionStatus::Created,
            current_layer: resumed_from.unwrap_or(0),
            total_layers: plan.layers.len(),
            resumed_from,
            task_statuses,
            locks: BTreeMap::new(),
            stats: SessionStats {
                layers_total: plan.layers.len(),
                ..Default::default()
            },
            task_started_at: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }

    pub fn task_status(&self, task_id: &str) -> Option<&TaskStatus> {
        self.task_statuses.get(task_id)
    }

    /// 转换任务状态，返回旧状态
    pub fn transition_task(
        &mut self,
        task_id: &str,
        to: TaskStatus,
    ) -> Result<TaskStatus, TransitionError> {
        let from = self
            .task_statuses
            .get(task_id)
            .cloned()
            .unwrap_or(TaskStatus::Pending);
        StateTransition::validate(&from, &to)?;

        let now = Utc::now();
        match &to {
            TaskStatus::Executing => {
                self.task_started_at.insert(task_id.to_string(), now);
            }
            TaskStatus::Completed | TaskStatus::Failed { .. } => {
                if let Some(started) = self.task_started_at.remove(task_id) {
                    let ms = (now - started).num_milliseconds().max(0) as u64;
                    self.stats.task_durations_ms.insert(task_id.to_string(), ms);
                }
            }
            TaskStatus::Pending => {
                self.task_started_at.remove(task_id);
            }
            _ => {}
        }

        self.task_statuses.insert(task_id.to_string(), to);
        if self.status == SessionStatus::Created {
            self.status = SessionStatus::Running;
        }
        self.updated_at = now;
        Ok(from)
    }

    /// 结束会话
    pub fn finish(&mut self, status: SessionStatus, error: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.error = error;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// 持续时间（毫秒）
    pub fn duration_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds().max(0) as u64
    }

    pub fn count(&self, label: &str) -> usize {
        self.task_statuses
            .values()
            .filter(|s| s.label() == label)
            .count()
    }
}

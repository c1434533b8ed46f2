//! 状态类型定义

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待调度
    Pending,
    /// 已调度，等待资源锁
    Ready,
    /// 执行中
    Executing,
    /// 评审中
    Reviewing,
    /// 完成
    Completed,
    /// 失败
    Failed { error: String },
}

impl TaskStatus {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// 已开始但尚未结束（崩溃后需要重置）
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Ready | Self::Executing | Self::Reviewing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 状态事件
///
/// 广播给订阅者，并以 [`EventRecord`] 的形式追加写入事件日志。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    /// 会话创建
    SessionCreated {
        session_id: String,
        plan_id: String,
        total_tasks: usize,
        resumed_from: Option<usize>,
    },
    /// 任务状态变更
    TaskStatusChanged {
        session_id: String,
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    LockAcquired {
        session_id: String,
        task_id: String,
        resources: Vec<String>,
    },
    LockReleased {
        session_id: String,
        task_id: String,
        resources: Vec<String>,
    },
    /// 资源锁争用（每个任务每次等待记录一次）
    LockContention {
        session_id: String,
        task_id: String,
        blocked_on: Vec<String>,
    },
    /// 评审结果
    ReviewRecorded {
        session_id: String,
        task_id: String,
        approved: bool,
        reason: Option<String>,
    },
    LayerStarted {
        session_id: String,
        layer: usize,
        tasks: Vec<String>,
    },
    LayerCompleted {
        session_id: String,
        layer: usize,
        success: bool,
    },
    /// 检查点写入
    CheckpointCreated {
        session_id: String,
        plan_id: String,
        last_completed_layer: Option<usize>,
        completed_tasks: usize,
    },
    /// 从检查点恢复
    CheckpointRestored {
        session_id: String,
        plan_id: String,
        next_layer: usize,
        completed_tasks: usize,
    },
    /// 会话完成
    SessionCompleted {
        session_id: String,
        duration_ms: u64,
    },
    /// 会话失败
    SessionFailed { session_id: String, error: String },
}

impl StateEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionCreated { session_id, .. }
            | Self::TaskStatusChanged { session_id, .. }
            | Self::LockAcquired { session_id, .. }
            | Self::LockReleased { session_id, .. }
            | Self::LockContention { session_id, .. }
            | Self::ReviewRecorded { session_id, .. }
            | Self::LayerStarted { session_id, .. }
            | Self::LayerCompleted { session_id, .. }
            | Self::CheckpointCreated { session_id, .. }
            | Self::CheckpointRestored { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionFailed { session_id, .. } => session_id,
        }
    }

    /// 事件名（与事件日志中的 `event` 字段一致）
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session_created",
            Self::TaskStatusChanged { .. } => "task_status_changed",
            Self::LockAcquired { .. } => "lock_acquired",
            Self::LockReleased { .. } => "lock_released",
            Self::LockContention { .. } => "lock_contention",
            Self::ReviewRecorded { .. } => "review_recorded",
            Self::LayerStarted { .. } => "layer_started",
            Self::LayerCompleted { .. } => "layer_completed",
            Self::CheckpointCreated { .. } => "checkpoint_created",
            Self::CheckpointRestored { .. } => "checkpoint_restored",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionFailed { .. } => "session_failed",
        }
    }
}

/// 事件日志中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StateEvent,
}

impl EventRecord {
    pub fn now(event: StateEvent) -> Self {
        Self {
            ts: Utc::now(),
            event,
        }
    }
}

//! 状态管理器

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::events::EventLog;
use super::session::{Session, SessionStatus};
use super::snapshot::{read_json, write_json_atomic};
use super::types::{EventRecord, StateEvent, TaskStatus};
use crate::error::ExecutorError;
use crate::executor::types::ReviewVerdict;
use crate::plan::{Plan, ResourceRef};

const ACTIVE_POINTER: &str = "active_session";

fn io_err(e: anyhow::Error) -> ExecutorError {
    ExecutorError::CheckpointIo(format!("{e:#}"))
}

/// 状态管理器
///
/// 目录布局：
///
/// ```text
/// <root>/sessions/<session_id>.json   会话快照（整体覆盖）
/// <root>/active_session               最近一次会话的指针
/// <root>/events.jsonl                 追加写入的事件日志
/// <root>/checkpoints/<plan_id>.json   检查点
/// ```
///
/// 每次变更都在写锁内完成快照写入和事件追加，保证单写者。
#[derive(Clone)]
pub struct StateManager {
    inner: Arc<StateManagerInner>,
}

struct StateManagerInner {
    root: PathBuf,
    /// 本进程内的会话
    sessions: RwLock<HashMap<String, Session>>,
    events: EventLog,
    checkpoints: CheckpointStore,
    /// 事件广播通道
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// 创建状态管理器，必要时创建目录
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ExecutorError> {
        let root = root.into();
        for dir in [root.join("sessions"), root.join("checkpoints")] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                ExecutorError::CheckpointIo(format!("Failed to create state directory {:?}: {e}", dir))
            })?;
        }

        let (event_tx, _) = broadcast::channel(1000);
        let inner = StateManagerInner {
            events: EventLog::new(root.join("events.jsonl")),
            checkpoints: CheckpointStore::new(root.join("checkpoints")),
            root,
            sessions: RwLock::new(HashMap::new()),
            event_tx,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.inner.checkpoints
    }

    pub fn event_log(&self) -> &EventLog {
        &self.inner.events
    }

    /// 订阅状态事件
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.event_tx.subscribe()
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.inner
            .root
            .join("sessions")
            .join(format!("{session_id}.json"))
    }

    fn pointer_path(&self) -> PathBuf {
        self.inner.root.join(ACTIVE_POINTER)
    }

    fn write_snapshot(&self, session: &Session) -> Result<(), ExecutorError> {
        write_json_atomic(self.session_path(&session.session_id), session).map_err(io_err)
    }

    fn write_pointer(&self, session_id: &str) -> Result<(), ExecutorError> {
        let path = self.pointer_path();
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, session_id)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| ExecutorError::CheckpointIo(format!("Failed to write {:?}: {e}", path)))
    }

    /// 追加事件日志并广播
    async fn emit_event(&self, event: StateEvent) -> Result<(), ExecutorError> {
        self.inner
            .events
            .append(&EventRecord::now(event.clone()))
            .await
            .map_err(io_err)?;
        let _ = self.inner.event_tx.send(event);
        Ok(())
    }

    /// 在写锁内修改会话、覆盖快照并记录事件
    async fn update<F>(&self, session_id: &str, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce(&mut Session) -> Result<Vec<StateEvent>, ExecutorError>,
    {
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ExecutorError::Runner(format!("Session not found: {session_id}")))?;

        let events = f(session)?;
        self.write_snapshot(session)?;
        for event in events {
            self.emit_event(event).await?;
        }
        Ok(())
    }

    /// 创建新会话并设为当前会话
    pub async fn create_session(
        &self,
        plan: &Plan,
        preloaded: &BTreeSet<String>,
        resumed_from: Option<usize>,
    ) -> Result<String, ExecutorError> {
        let session = Session::new(plan, preloaded, resumed_from);
        let session_id = session.session_id.clone();

        let mut sessions = self.inner.sessions.write().await;
        self.write_snapshot(&session)?;
        self.write_pointer(&session_id)?;
        sessions.insert(session_id.clone(), session);

        self.emit_event(StateEvent::SessionCreated {
            session_id: session_id.clone(),
            plan_id: plan.plan_id.clone(),
            total_tasks: plan.total_tasks(),
            resumed_from,
        })
        .await?;

        tracing::info!(session_id = %session_id, plan_id = %plan.plan_id, "session created");
        Ok(session_id)
    }

    /// 获取会话状态（先查内存，再查磁盘）
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, ExecutorError> {
        if let Some(s) = self.inner.sessions.read().await.get(session_id) {
            return Ok(Some(s.clone()));
        }
        self.load_session(session_id)
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>, ExecutorError> {
        read_json(self.session_path(session_id)).map_err(io_err)
    }

    /// 最近一次会话（指针指向的会话）
    pub fn latest_session(&self) -> Result<Option<Session>, ExecutorError> {
        let path = self.pointer_path();
        if !path.exists() {
            return Ok(None);
        }
        let id = std::fs::read_to_string(&path)
            .map_err(|e| ExecutorError::CheckpointIo(format!("Failed to read {:?}: {e}", path)))?;
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }
        self.load_session(id)
    }

    /// 崩溃检测：指针指向的会话既未完成也未失败
    pub fn detect_interrupted_session(&self) -> Result<Option<Session>, ExecutorError> {
        Ok(self.latest_session()?.filter(Session::is_active))
    }

    /// 将被中断的会话标记为失败，使其不再悬空
    pub async fn abandon_session(&self, mut session: Session, reason: &str) -> Result<(), ExecutorError> {
        for status in session.task_statuses.values_mut() {
            if status.is_in_flight() {
                *status = TaskStatus::Pending;
            }
        }
        session.locks.clear();
        session.task_started_at.clear();
        session.finish(SessionStatus::Failed, Some(reason.to_string()));
        self.write_snapshot(&session)?;

        tracing::warn!(session_id = %session.session_id, reason, "abandoned interrupted session");
        self.emit_event(StateEvent::SessionFailed {
            session_id: session.session_id.clone(),
            error: reason.to_string(),
        })
        .await
    }

    /// 转换任务状态，返回旧状态
    pub async fn transition_task(
        &self,
        session_id: &str,
        task_id: &str,
        to: TaskStatus,
    ) -> Result<TaskStatus, ExecutorError> {
        let mut previous = TaskStatus::Pending;
        self.update(session_id, |session| {
            let from = session
                .transition_task(task_id, to.clone())
                .map_err(|e| ExecutorError::Runner(format!("task '{task_id}': {e}")))?;
            previous = from.clone();
            tracing::debug!(session_id, task_id, from = %from, to = %to, "task status changed");
            Ok(vec![StateEvent::TaskStatusChanged {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
                from,
                to,
            }])
        })
        .await?;
        Ok(previous)
    }

    pub async fn record_lock_acquired(
        &self,
        session_id: &str,
        task_id: &str,
        resources: &[ResourceRef],
    ) -> Result<(), ExecutorError> {
        let keys: Vec<String> = resources.iter().map(ResourceRef::key).collect();
        self.update(session_id, |session| {
            for key in &keys {
                session.locks.insert(key.clone(), task_id.to_string());
            }
            Ok(vec![StateEvent::LockAcquired {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
                resources: keys.clone(),
            }])
        })
        .await
    }

    pub async fn record_lock_released(
        &self,
        session_id: &str,
        task_id: &str,
        resources: &[ResourceRef],
    ) -> Result<(), ExecutorError> {
        let keys: Vec<String> = resources.iter().map(ResourceRef::key).collect();
        self.update(session_id, |session| {
            session.locks.retain(|_, holder| holder != task_id);
            Ok(vec![StateEvent::LockReleased {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
                resources: keys.clone(),
            }])
        })
        .await
    }

    pub async fn record_lock_contention(
        &self,
        session_id: &str,
        task_id: &str,
        blocked_on: Vec<String>,
    ) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            session.stats.lock_contention += 1;
            Ok(vec![StateEvent::LockContention {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
                blocked_on,
            }])
        })
        .await
    }

    pub async fn record_review(
        &self,
        session_id: &str,
        task_id: &str,
        verdict: &ReviewVerdict,
    ) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            let reason = match verdict {
                ReviewVerdict::Approved => {
                    session.stats.reviews_approved += 1;
                    None
                }
                ReviewVerdict::Rejected { reason } => {
                    session.stats.reviews_rejected += 1;
                    Some(reason.clone())
                }
            };
            Ok(vec![StateEvent::ReviewRecorded {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
                approved: verdict.is_approved(),
                reason,
            }])
        })
        .await
    }

    pub async fn start_layer(
        &self,
        session_id: &str,
        layer: usize,
        tasks: &[String],
    ) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            session.current_layer = layer;
            if session.status == SessionStatus::Created {
                session.status = SessionStatus::Running;
            }
            Ok(vec![StateEvent::LayerStarted {
                session_id: session_id.to_string(),
                layer,
                tasks: tasks.to_vec(),
            }])
        })
        .await
    }

    pub async fn complete_layer(
        &self,
        session_id: &str,
        layer: usize,
        success: bool,
    ) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            if success {
                session.stats.layers_completed += 1;
            }
            Ok(vec![StateEvent::LayerCompleted {
                session_id: session_id.to_string(),
                layer,
                success,
            }])
        })
        .await
    }

    /// 记录新的并发峰值
    pub async fn record_parallelism(&self, session_id: &str, active: usize) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            session.stats.peak_parallelism = session.stats.peak_parallelism.max(active);
            Ok(Vec::new())
        })
        .await
    }

    /// 写入检查点
    pub async fn save_checkpoint(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), ExecutorError> {
        // 与会话快照共用写锁，保证检查点写入的顺序
        let _guard = self.inner.sessions.write().await;
        self.inner.checkpoints.save(checkpoint)?;
        tracing::debug!(
            session_id,
            plan_id = %checkpoint.plan_id,
            last_completed_layer = ?checkpoint.last_completed_layer,
            completed = checkpoint.completed_tasks.len(),
            "checkpoint saved"
        );
        self.emit_event(StateEvent::CheckpointCreated {
            session_id: session_id.to_string(),
            plan_id: checkpoint.plan_id.clone(),
            last_completed_layer: checkpoint.last_completed_layer,
            completed_tasks: checkpoint.completed_tasks.len(),
        })
        .await
    }

    /// 记录从检查点恢复
    pub async fn restore_checkpoint(
        &self,
        session_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), ExecutorError> {
        tracing::info!(
            session_id,
            plan_id = %checkpoint.plan_id,
            next_layer = checkpoint.next_layer(),
            "resuming from checkpoint"
        );
        self.emit_event(StateEvent::CheckpointRestored {
            session_id: session_id.to_string(),
            plan_id: checkpoint.plan_id.clone(),
            next_layer: checkpoint.next_layer(),
            completed_tasks: checkpoint.completed_tasks.len(),
        })
        .await
    }

    /// 完成会话
    pub async fn complete_session(&self, session_id: &str) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            session.finish(SessionStatus::Completed, None);
            Ok(vec![StateEvent::SessionCompleted {
                session_id: session_id.to_string(),
                duration_ms: session.duration_ms(),
            }])
        })
        .await
    }

    /// 会话失败；未开始的任务保持 Pending
    pub async fn fail_session(&self, session_id: &str, error: String) -> Result<(), ExecutorError> {
        self.update(session_id, |session| {
            session.finish(SessionStatus::Failed, Some(error.clone()));
            Ok(vec![StateEvent::SessionFailed {
                session_id: session_id.to_string(),
                error,
            }])
        })
        .await
    }
}

//! 检查点：记录已完成的层和任务，用于中断后恢复

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{read_json, write_json_atomic};
use crate::error::ExecutorError;

/// 检查点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub plan_id: String,
    pub session_id: String,
    /// 最后一个完整完成的层
    pub last_completed_layer: Option<usize>,
    /// 已完成的任务（有序）
    pub completed_tasks: Vec<String>,
    /// 已完成任务产生的文件，恢复后仍可为下游任务生成依赖摘要
    #[serde(default)]
    pub task_outputs: BTreeMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(plan_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            plan_id: plan_id.into(),
            session_id: session_id.into(),
            last_completed_layer: None,
            completed_tasks: Vec::new(),
            task_outputs: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 恢复时的起始层
    pub fn next_layer(&self) -> usize {
        self.last_completed_layer.map_or(0, |l| l + 1)
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed_tasks.binary_search_by(|t| t.as_str().cmp(task_id)).is_ok()
    }

    pub fn completed_set(&self) -> BTreeSet<String> {
        self.completed_tasks.iter().cloned().collect()
    }

    pub fn record_task(&mut self, task_id: &str, outputs: Vec<String>) {
        if let Err(pos) = self
            .completed_tasks
            .binary_search_by(|t| t.as_str().cmp(task_id))
        {
            self.completed_tasks.insert(pos, task_id.to_string());
        }
        self.task_outputs.insert(task_id.to_string(), outputs);
        self.updated_at = Utc::now();
    }

    pub fn complete_layer(&mut self, layer: usize) {
        self.last_completed_layer = Some(layer);
        self.updated_at = Utc::now();
    }

    /// 继续使用已有检查点的新会话
    pub fn continue_in(&mut self, session_id: &str) {
        self.session_id = session_id.to_string();
        self.updated_at = Utc::now();
    }
}

/// 检查点存储：`<dir>/<plan_id>.json`
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, plan_id: &str) -> PathBuf {
        let safe: String = plan_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), ExecutorError> {
        let path = self.path_for(&checkpoint.plan_id);
        write_json_atomic(&path, checkpoint).map_err(|e| ExecutorError::CheckpointIo(format!("{e:#}")))
    }

    pub fn load(&self, plan_id: &str) -> Result<Option<Checkpoint>, ExecutorError> {
        let cp: Option<Checkpoint> = read_json(self.path_for(plan_id))
            .map_err(|e| ExecutorError::CheckpointIo(format!("{e:#}")))?;
        match cp {
            Some(cp) if cp.plan_id != plan_id => Err(ExecutorError::CheckpointIo(format!(
                "checkpoint for plan '{}' found in slot of plan '{}'",
                cp.plan_id, plan_id
            ))),
            other => Ok(other),
        }
    }

    /// 删除检查点；返回是否存在过
    pub fn clear(&self, plan_id: &str) -> Result<bool, ExecutorError> {
        let path = self.path_for(plan_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .map_err(|e| ExecutorError::CheckpointIo(format!("Failed to remove {:?}: {e}", path)))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_layer() {
        let mut cp = Checkpoint::new("p", "s");
        assert_eq!(cp.next_layer(), 0);
        cp.complete_layer(1);
        assert_eq!(cp.next_layer(), 2);
    }

    #[test]
    fn test_record_task_keeps_sorted_unique() {
        let mut cp = Checkpoint::new("p", "s");
        cp.record_task("t3", vec![]);
        cp.record_task("t1", vec!["a.rs".into()]);
        cp.record_task("t3", vec![]);
        assert_eq!(cp.completed_tasks, vec!["t1", "t3"]);
        assert!(cp.is_completed("t1"));
        assert!(!cp.is_completed("t2"));
    }

    #[test]
    fn test_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut cp = Checkpoint::new("plan-1", "s1");
        cp.record_task("t1", vec!["x.sql".into()]);
        cp.complete_layer(0);
        store.save(&cp).unwrap();

        let back = store.load("plan-1").unwrap().unwrap();
        assert_eq!(back, cp);

        assert!(store.clear("plan-1").unwrap());
        assert!(store.load("plan-1").unwrap().is_none());
        assert!(!store.clear("plan-1").unwrap());
    }

    #[test]
    fn test_corrupt_checkpoint_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        std::fs::write(store.path_for("p"), "garbage").unwrap();
        assert!(matches!(store.load("p"), Err(ExecutorError::CheckpointIo(_))));
    }

    #[test]
    fn test_plan_id_is_sanitized() {
        let store = CheckpointStore::new("/tmp/x");
        assert_eq!(store.path_for("../evil"), PathBuf::from("/tmp/x/___evil.json"));
    }
}

//! 追加写入的事件日志（JSONL）

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use super::types::EventRecord;

/// Append-only JSONL event log. Lines are never rewritten.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &EventRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize event")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open event log {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to event log {:?}", self.path))?;
        file.flush().await?;
        Ok(())
    }

    /// Read every well-formed record; a torn trailing line from a crash is skipped.
    pub fn read_all(&self) -> Result<Vec<EventRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read event log {:?}", self.path))?;

        let mut out = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(line) {
                Ok(record) => out.push(record),
                Err(e) => tracing::warn!(line = idx + 1, error = %e, "skipping malformed event"),
            }
        }
        Ok(out)
    }

    pub fn read_session(&self, session_id: &str) -> Result<Vec<EventRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.event.session_id() == session_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::StateEvent;

    #[tokio::test]
    async fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));

        for layer in 0..3 {
            log.append(&EventRecord::now(StateEvent::LayerStarted {
                session_id: "s1".into(),
                layer,
                tasks: vec![],
            }))
            .await
            .unwrap();
        }
        log.append(&EventRecord::now(StateEvent::SessionFailed {
            session_id: "s2".into(),
            error: "x".into(),
        }))
        .await
        .unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 4);
        let layers: Vec<usize> = log
            .read_session("s1")
            .unwrap()
            .into_iter()
            .filter_map(|r| match r.event {
                StateEvent::LayerStarted { layer, .. } => Some(layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        assert!(log.read_all().unwrap().is_empty());

        tokio_test::block_on(log.append(&EventRecord::now(StateEvent::SessionCompleted {
            session_id: "s".into(),
            duration_ms: 3,
        })))
        .unwrap();
        assert_eq!(log.read_session("s").unwrap().len(), 1);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            "{\"ts\":\"2024-01-01T00:00:00Z\",\"event\":\"session_failed\",\"session_id\":\"s\",\"error\":\"e\"}\n{\"ts\":",
        )
        .unwrap();
        let log = EventLog::new(path);
        assert_eq!(log.read_all().unwrap().len(), 1);
    }
}

//! CLI 装配层：解析配置、打开状态目录，并把状态事件转发到日志。
use std::path::Path;

use strata_core::config::{self, AppConfig};
use strata_core::error::CliError;
use strata_core::state::{StateEvent, StateManager};

pub struct AppContext {
    cfg: AppConfig,
    state: StateManager,
}

impl AppContext {
    pub fn new(cfg: AppConfig) -> Result<Self, CliError> {
        let root = config::state_dir(&cfg).map_err(|e| CliError::Config(format!("{e:#}")))?;
        let state = StateManager::new(&root)?;
        tracing::debug!(state_dir = %root.display(), "state directory ready");
        Ok(Self { cfg, state })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Mirror state events into the log. Must be called inside a tokio runtime.
    pub fn spawn_event_logger(&self) {
        let mut event_rx = self.state.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = event_rx.recv().await {
                log_state_event(&event);
            }
        });
    }
}

fn log_state_event(event: &StateEvent) {
    match event {
        StateEvent::SessionCreated {
            session_id,
            plan_id,
            resumed_from,
            ..
        } => {
            tracing::debug!(%session_id, %plan_id, ?resumed_from, "session created");
        }
        StateEvent::TaskStatusChanged {
            session_id,
            task_id,
            from,
            to,
        } => {
            tracing::debug!(%session_id, %task_id, "{} -> {}", from, to);
        }
        StateEvent::LockContention {
            task_id, blocked_on, ..
        } => {
            tracing::debug!(%task_id, ?blocked_on, "lock contention");
        }
        StateEvent::CheckpointCreated {
            last_completed_layer,
            completed_tasks,
            ..
        } => {
            tracing::debug!(?last_completed_layer, completed_tasks, "checkpoint written");
        }
        StateEvent::SessionCompleted {
            session_id,
            duration_ms,
        } => {
            tracing::info!("Session {} completed ({}ms)", session_id, duration_ms);
        }
        StateEvent::SessionFailed { session_id, error } => {
            tracing::error!("Session {} failed: {}", session_id, error);
        }
        _ => {}
    }
}

/// Load config (explicit file or defaults) and apply the global `--state-dir` override.
pub fn load_config(explicit: Option<&Path>, state_dir: Option<&str>) -> Result<AppConfig, CliError> {
    let mut cfg = config::load(explicit).map_err(|e| CliError::Config(format!("{e:#}")))?;
    if let Some(dir) = state_dir {
        cfg.state.directory = Some(config::expand_tilde(dir));
    }
    Ok(cfg)
}

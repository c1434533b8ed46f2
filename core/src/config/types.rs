use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "strata_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// When the runner persists a checkpoint during a healthy run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointGranularity {
    #[default]
    Layer,
    Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Worker pool size inside one layer.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,

    /// Hard limit for lock acquisition; exceeding it fails the task.
    #[serde(default = "default_lock_max_wait_ms")]
    pub lock_max_wait_ms: u64,

    #[serde(default)]
    pub checkpoint: CheckpointGranularity,

    #[serde(default = "default_progress_bar")]
    pub progress_bar: bool,

    /// "text" or "jsonl"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_max_parallel() -> usize {
    5
}

fn default_lock_poll_interval_ms() -> u64 {
    2_000
}

fn default_lock_max_wait_ms() -> u64 {
    60_000
}

fn default_progress_bar() -> bool {
    true
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            lock_max_wait_ms: default_lock_max_wait_ms(),
            checkpoint: CheckpointGranularity::default(),
            progress_bar: default_progress_bar(),
            format: default_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Cached schema/convention corpus (JSON). Missing file means an empty corpus.
    #[serde(default)]
    pub corpus_path: Option<String>,

    /// Relationship hops followed from directly referenced entities.
    #[serde(default = "default_expansion_depth")]
    pub expansion_depth: usize,
}

fn default_expansion_depth() -> usize {
    1
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            expansion_depth: default_expansion_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Root for sessions, checkpoints and the event log. Defaults to ~/.strata/state.
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerKind {
    #[default]
    Auto,
    Command,
    Outputs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Shell command run once per task; receives `{task, context}` JSON on stdin.
    #[serde(default)]
    pub executor_command: Option<String>,

    #[serde(default)]
    pub reviewer: ReviewerKind,

    #[serde(default)]
    pub reviewer_command: Option<String>,
}

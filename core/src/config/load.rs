use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default strata data directory: ~/.strata
pub fn get_strata_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".strata"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    load(None)
}

/// Load `explicit` if given, otherwise the first config found in the usual places,
/// then fill directory defaults and apply environment overrides.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.strata/config.toml
    let data_dir = get_strata_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./strata.toml (current directory)
    let local_config = Path::new("strata.toml");

    let mut cfg = if let Some(path) = explicit {
        load_from_file(path)?
    } else if user_config.exists() {
        load_from_file(&user_config)?
    } else if local_config.exists() {
        load_from_file(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg
        .state
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.state.directory = Some(data_dir.join("state").to_string_lossy().to_string());
    }

    if cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg)?;
    expand_paths(&mut cfg);

    Ok(cfg)
}

pub fn load_from_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("Invalid config {}", path.display()))
}

/// Environment variable overrides (highest priority)
fn apply_env_overrides(cfg: &mut AppConfig) -> anyhow::Result<()> {
    if let Some(v) = non_empty_env("STRATA_MAX_PARALLEL") {
        cfg.executor.max_parallel = v
            .parse()
            .with_context(|| format!("STRATA_MAX_PARALLEL is not a number: {v}"))?;
    }
    if let Some(v) = non_empty_env("STRATA_STATE_DIR") {
        cfg.state.directory = Some(v);
    }
    if let Some(v) = non_empty_env("STRATA_CORPUS") {
        cfg.context.corpus_path = Some(v);
    }
    if let Some(v) = non_empty_env("STRATA_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn expand_paths(cfg: &mut AppConfig) {
    for path in [
        &mut cfg.state.directory,
        &mut cfg.logging.directory,
        &mut cfg.context.corpus_path,
    ]
    .into_iter()
    .flatten()
    {
        *path = expand_tilde(path);
    }
}

pub fn expand_tilde(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

/// Resolved state directory, falling back to ~/.strata/state.
pub fn state_dir(cfg: &AppConfig) -> anyhow::Result<PathBuf> {
    match cfg.state.directory.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(expand_tilde(dir))),
        _ => Ok(get_strata_data_dir()?.join("state")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckpointGranularity;
    use std::io::Write;

    #[test]
    fn test_defaults_match_runner_contract() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.executor.max_parallel, 5);
        assert_eq!(cfg.executor.lock_poll_interval_ms, 2_000);
        assert_eq!(cfg.executor.lock_max_wait_ms, 60_000);
        assert_eq!(cfg.executor.checkpoint, CheckpointGranularity::Layer);
        assert_eq!(cfg.context.expansion_depth, 1);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[executor]\nmax_parallel = 2\ncheckpoint = \"task\"\n\n[context]\nexpansion_depth = 2"
        )
        .unwrap();

        let cfg = load_from_file(file.path()).unwrap();
        assert_eq!(cfg.executor.max_parallel, 2);
        assert_eq!(cfg.executor.checkpoint, CheckpointGranularity::Task);
        assert_eq!(cfg.executor.lock_max_wait_ms, 60_000);
        assert_eq!(cfg.context.expansion_depth, 2);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nmax_parallel = \"many\"").unwrap();

        let err = load_from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid config"));
    }

    #[test]
    fn test_state_dir_expands_tilde() {
        let mut cfg = AppConfig::default();
        cfg.state.directory = Some("~/custom-state".to_string());
        let dir = state_dir(&cfg).unwrap();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("custom-state"));
    }
}

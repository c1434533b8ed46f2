use std::sync::Arc;

use anyhow::{bail, Result};

use strata_core::config::{PluginsConfig, ReviewerKind};
use strata_core::executor::traits::{OutputRendererPlugin, TaskExecutor, TaskReviewer};

use crate::executor::{CommandExecutor, JsonlRendererPlugin, TextRendererPlugin};
use crate::reviewer::{AutoApproveReviewer, CommandReviewer, OutputsRequiredReviewer};

pub fn build_executor(cfg: &PluginsConfig) -> Result<Arc<dyn TaskExecutor>> {
    match cfg.executor_command.as_deref().map(str::trim) {
        Some(cmd) if !cmd.is_empty() => Ok(Arc::new(CommandExecutor::new(cmd))),
        _ => bail!("No executor command configured (set [plugins].executor_command or pass --executor-cmd)"),
    }
}

pub fn build_reviewer(cfg: &PluginsConfig) -> Result<Arc<dyn TaskReviewer>> {
    match cfg.reviewer {
        ReviewerKind::Auto => Ok(Arc::new(AutoApproveReviewer::new())),
        ReviewerKind::Outputs => Ok(Arc::new(OutputsRequiredReviewer::new())),
        ReviewerKind::Command => match cfg.reviewer_command.as_deref().map(str::trim) {
            Some(cmd) if !cmd.is_empty() => Ok(Arc::new(CommandReviewer::new(cmd))),
            _ => bail!("reviewer = \"command\" requires [plugins].reviewer_command"),
        },
    }
}

pub fn build_renderer(stream_format: &str) -> Arc<dyn OutputRendererPlugin> {
    match stream_format {
        "jsonl" => Arc::new(JsonlRendererPlugin::new(false)),
        // Anything other than jsonl behaves like text.
        _ => Arc::new(TextRendererPlugin::new(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_requires_command() {
        assert!(build_executor(&PluginsConfig::default()).is_err());

        let cfg = PluginsConfig {
            executor_command: Some("./gen.sh".into()),
            ..Default::default()
        };
        assert_eq!(build_executor(&cfg).unwrap().name(), "command");
    }

    #[test]
    fn test_reviewer_kinds() {
        assert_eq!(build_reviewer(&PluginsConfig::default()).unwrap().name(), "auto");

        let mut cfg = PluginsConfig {
            reviewer: ReviewerKind::Command,
            ..Default::default()
        };
        assert!(build_reviewer(&cfg).is_err());
        cfg.reviewer_command = Some("./review.sh".into());
        assert_eq!(build_reviewer(&cfg).unwrap().name(), "command");

        cfg.reviewer = ReviewerKind::Outputs;
        assert_eq!(build_reviewer(&cfg).unwrap().name(), "outputs");
    }

    #[test]
    fn test_renderer_format() {
        assert_eq!(build_renderer("jsonl").format(), "jsonl");
        assert_eq!(build_renderer("anything").format(), "text");
    }
}

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use strata_core::config::{AppConfig, CheckpointGranularity, ReviewerKind};
use strata_core::context::{ContextAssembler, SchemaCorpus};
use strata_core::error::CliError;
use strata_core::executor::{ExecutionOpts, ExecutionReport, ExecutionRunner};
use strata_core::plan::Plan;
use strata_plugins::factory::{build_executor, build_renderer, build_reviewer};

use super::cli::{CheckpointArg, OutputFormat, ReviewerArg, RunArgs};
use crate::app::AppContext;

/// Fold command-line overrides into the loaded config.
pub fn apply_run_overrides(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(cmd) = &args.executor_cmd {
        cfg.plugins.executor_command = Some(cmd.clone());
    }
    if let Some(reviewer) = args.reviewer {
        cfg.plugins.reviewer = match reviewer {
            ReviewerArg::Auto => ReviewerKind::Auto,
            ReviewerArg::Command => ReviewerKind::Command,
            ReviewerArg::Outputs => ReviewerKind::Outputs,
        };
    }
    if let Some(cmd) = &args.reviewer_cmd {
        cfg.plugins.reviewer_command = Some(cmd.clone());
    }
    if let Some(n) = args.max_parallel {
        cfg.executor.max_parallel = n;
    }
    if let Some(granularity) = args.checkpoint {
        cfg.executor.checkpoint = match granularity {
            CheckpointArg::Layer => CheckpointGranularity::Layer,
            CheckpointArg::Task => CheckpointGranularity::Task,
        };
    }
    if let Some(format) = args.format {
        cfg.executor.format = format.as_str().to_string();
    }
    if args.no_progress {
        cfg.executor.progress_bar = false;
    }
    if let Some(corpus) = &args.corpus {
        cfg.context.corpus_path = Some(corpus.clone());
    }
}

fn build_assembler(cfg: &AppConfig) -> anyhow::Result<ContextAssembler> {
    let corpus = SchemaCorpus::load_or_default(cfg.context.corpus_path.as_deref().map(Path::new))?;
    Ok(ContextAssembler::new(Arc::new(corpus)).with_expansion_depth(cfg.context.expansion_depth))
}

#[tracing::instrument(name = "cli.run", skip(args, ctx), fields(plan = %args.plan.display()))]
pub async fn handle_run(args: RunArgs, ctx: &AppContext, resume: bool) -> Result<i32, CliError> {
    let mut cfg = ctx.cfg().clone();
    apply_run_overrides(&mut cfg, &args);

    let plan = Plan::load_from_file(&args.plan)?;
    let spec = std::fs::read(&args.spec)
        .with_context(|| format!("Failed to read spec {}", args.spec.display()))?;

    if resume && ctx.state().checkpoints().load(&plan.plan_id)?.is_none() {
        return Err(CliError::Command(format!(
            "no checkpoint for plan {}; use `strata run` to start it",
            plan.plan_id
        )));
    }

    let executor = build_executor(&cfg.plugins)?;
    let reviewer = build_reviewer(&cfg.plugins)?;

    let mut opts = ExecutionOpts::from_config(&cfg.executor);
    opts.verbose = args.verbose;
    opts.quiet = args.quiet;

    let mut builder = ExecutionRunner::builder(ctx.state().clone())
        .opts(opts)
        .assembler(Arc::new(build_assembler(&cfg)?));
    if cfg.executor.format == OutputFormat::Jsonl.as_str() {
        builder = builder.renderer(build_renderer(&cfg.executor.format));
    }
    let runner = builder.build();

    let report = runner.execute_plan(&plan, &spec, executor, reviewer).await?;
    Ok(exit_code_for_report(report))
}

pub fn exit_code_for_report(report: ExecutionReport) -> i32 {
    match report.into_result() {
        Ok(_) => 0,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            i32::from(e.error_code().as_u16())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::commands::cli::{Args, Commands};

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["strata", "run", "--plan", "p.json", "--spec", "s.md"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_overrides_replace_config() {
        let mut cfg = AppConfig::default();
        apply_run_overrides(
            &mut cfg,
            &run_args(&[
                "--executor-cmd",
                "./gen.sh",
                "--reviewer",
                "command",
                "--reviewer-cmd",
                "./review.sh",
                "--max-parallel",
                "2",
                "--checkpoint",
                "task",
                "--no-progress",
            ]),
        );

        assert_eq!(cfg.plugins.executor_command.as_deref(), Some("./gen.sh"));
        assert_eq!(cfg.plugins.reviewer, ReviewerKind::Command);
        assert_eq!(cfg.plugins.reviewer_command.as_deref(), Some("./review.sh"));
        assert_eq!(cfg.executor.max_parallel, 2);
        assert_eq!(cfg.executor.checkpoint, CheckpointGranularity::Task);
        assert!(!cfg.executor.progress_bar);
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let plan_path = dir.path().join("plan.json");
        let spec_path = dir.path().join("spec.md");
        std::fs::write(&spec_path, "# spec").unwrap();
        strata_core::plan::PlanBuilder::new("p")
            .build(vec![strata_core::plan::Task::new("T1", "t")], b"# spec")
            .unwrap()
            .save_to_file(&plan_path)
            .unwrap();

        let mut cfg = AppConfig::default();
        cfg.state.directory = Some(dir.path().join("state").to_string_lossy().into_owned());
        let ctx = AppContext::new(cfg).unwrap();

        let mut args = run_args(&["--executor-cmd", "true", "--quiet"]);
        args.plan = plan_path;
        args.spec = spec_path;

        let err = handle_run(args, &ctx, true).await.unwrap_err();
        assert!(matches!(err, CliError::Command(_)));
        assert!(ctx.state().latest_session().unwrap().is_none());
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut cfg = AppConfig::default();
        cfg.plugins.executor_command = Some("from-config".into());
        apply_run_overrides(&mut cfg, &run_args(&[]));

        assert_eq!(cfg.plugins.executor_command.as_deref(), Some("from-config"));
        assert_eq!(cfg.executor.max_parallel, 5);
        assert_eq!(cfg.executor.format, "text");
    }
}

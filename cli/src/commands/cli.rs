use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewerArg {
    /// Approve every successful outcome
    Auto,
    /// Run `--reviewer-cmd`; exit 0 approves
    Command,
    /// Reject outcomes that touched no files
    Outputs,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointArg {
    Layer,
    Task,
}

#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Layered task-plan orchestrator")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.strata/config.toml, then ./strata.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long, global = true)]
    pub state_dir: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    /// JSON array of task descriptors
    #[arg(long)]
    pub tasks: PathBuf,

    /// Specification document the plan is fingerprinted against
    #[arg(long)]
    pub spec: PathBuf,

    #[arg(long)]
    pub name: Option<String>,

    /// Write the plan here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LayersArgs {
    #[arg(long)]
    pub plan: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub plan: PathBuf,

    /// Current specification; must match the plan's checksum
    #[arg(long)]
    pub spec: PathBuf,

    /// Shell command run once per task (overrides [plugins].executor_command)
    #[arg(long)]
    pub executor_cmd: Option<String>,

    #[arg(long, value_enum)]
    pub reviewer: Option<ReviewerArg>,

    #[arg(long)]
    pub reviewer_cmd: Option<String>,

    #[arg(long)]
    pub max_parallel: Option<usize>,

    #[arg(long, value_enum)]
    pub checkpoint: Option<CheckpointArg>,

    /// Schema/convention corpus for context assembly
    #[arg(long)]
    pub corpus: Option<String>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub plan: PathBuf,

    /// Session to inspect (defaults to the most recent one)
    #[arg(long)]
    pub session: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ResetArgs {
    #[arg(long)]
    pub plan: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a layered plan from task descriptors
    Plan(PlanArgs),
    /// Print the execution layers of a plan
    Layers(LayersArgs),
    /// Execute a plan, continuing from its checkpoint if one exists
    Run(RunArgs),
    /// Continue a plan from its checkpoint; fails if there is none
    Resume(RunArgs),
    /// Progress of the latest (or given) session
    Status(StatusArgs),
    /// Every unfinished task and what blocks it
    Blockers(StatusArgs),
    /// Delete a plan's checkpoint so the next run starts over
    Reset(ResetArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "strata",
            "run",
            "--plan",
            "plan.json",
            "--spec",
            "spec.md",
            "--executor-cmd",
            "./gen.sh",
            "--reviewer",
            "outputs",
            "--max-parallel",
            "3",
            "--format",
            "jsonl",
        ])
        .unwrap();

        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.plan, PathBuf::from("plan.json"));
        assert_eq!(run.executor_cmd.as_deref(), Some("./gen.sh"));
        assert_eq!(run.reviewer, Some(ReviewerArg::Outputs));
        assert_eq!(run.max_parallel, Some(3));
        assert_eq!(run.format, Some(OutputFormat::Jsonl));
    }

    #[test]
    fn test_global_state_dir_after_subcommand() {
        let args =
            Args::try_parse_from(["strata", "reset", "--plan", "p.json", "--state-dir", "/tmp/s"])
                .unwrap();
        assert_eq!(args.state_dir.as_deref(), Some("/tmp/s"));
        assert!(matches!(args.command, Commands::Reset(_)));
    }

    #[test]
    fn test_plan_requires_spec() {
        assert!(Args::try_parse_from(["strata", "plan", "--tasks", "t.json"]).is_err());
    }
}

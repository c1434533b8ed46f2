use clap::Parser;
use strata_cli::app::{self, AppContext};
use strata_cli::commands::{cli, plan, run, status};
use strata_core::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let cfg = app::load_config(args.config.as_deref(), args.state_dir.as_deref())?;
    init_tracing(&cfg.logging).map_err(error::CliError::Command)?;

    // Plan construction never touches the state directory.
    match args.command {
        cli::Commands::Plan(plan_args) => plan::handle_plan(plan_args),
        cli::Commands::Layers(layers_args) => plan::handle_layers(layers_args),
        cmd => {
            let ctx = AppContext::new(cfg)?;
            ctx.spawn_event_logger();
            dispatch(cmd, &ctx).await
        }
    }
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success
    // 1..=60: executor error codes (see strata_core::error::ErrorCode)
    // 74: IO / command error
    // 78: config error
    match e {
        error::CliError::Executor(ee) => i32::from(ee.error_code().as_u16()),
        error::CliError::Config(_) => 78,
        error::CliError::Io(_) => 74,
        error::CliError::Command(_) => 74,
        error::CliError::Anyhow(_) => 1,
    }
}

async fn dispatch(cmd: cli::Commands, ctx: &AppContext) -> Result<i32, error::CliError> {
    match cmd {
        cli::Commands::Run(run_args) => run::handle_run(run_args, ctx, false).await,
        cli::Commands::Resume(run_args) => run::handle_run(run_args, ctx, true).await,
        cli::Commands::Status(status_args) => status::handle_status(status_args, ctx),
        cli::Commands::Blockers(status_args) => status::handle_blockers(status_args, ctx),
        cli::Commands::Reset(reset_args) => status::handle_reset(reset_args, ctx),
        cli::Commands::Plan(plan_args) => plan::handle_plan(plan_args),
        cli::Commands::Layers(layers_args) => plan::handle_layers(layers_args),
    }
}

fn init_tracing(logging: &strata_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("strata"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("strata.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

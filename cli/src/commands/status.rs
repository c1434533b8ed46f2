use strata_core::api::{pending_blockers, status_report, BlockReason, CliError, Plan, Session};

use super::cli::{ResetArgs, StatusArgs};
use crate::app::AppContext;

fn find_session(ctx: &AppContext, args: &StatusArgs, plan: &Plan) -> Result<Option<Session>, CliError> {
    let session = match &args.session {
        Some(id) => Some(
            ctx.state()
                .load_session(id)?
                .ok_or_else(|| CliError::Command(format!("session not found: {id}")))?,
        ),
        None => ctx.state().latest_session()?,
    };

    match session {
        Some(s) if s.plan_id != plan.plan_id => Err(CliError::Command(format!(
            "session {} belongs to plan {}, not {}",
            s.session_id, s.plan_id, plan.plan_id
        ))),
        other => Ok(other),
    }
}

pub fn handle_status(args: StatusArgs, ctx: &AppContext) -> Result<i32, CliError> {
    let plan = Plan::load_from_file(&args.plan)?;
    let Some(session) = find_session(ctx, &args, &plan)? else {
        let checkpoint = ctx.state().checkpoints().load(&plan.plan_id)?;
        match checkpoint {
            Some(cp) => println!(
                "No session recorded; checkpoint has {} completed tasks, next layer {}",
                cp.completed_tasks.len(),
                cp.next_layer()
            ),
            None => println!("Plan {} has not been run", plan.plan_id),
        }
        return Ok(0);
    };

    let report = status_report(&session, &plan);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).map_err(anyhow::Error::from)?);
    } else {
        print!("{report}");
    }
    Ok(0)
}

pub fn handle_blockers(args: StatusArgs, ctx: &AppContext) -> Result<i32, CliError> {
    let plan = Plan::load_from_file(&args.plan)?;
    let Some(session) = find_session(ctx, &args, &plan)? else {
        println!("Plan {} has not been run", plan.plan_id);
        return Ok(0);
    };

    let blockers = pending_blockers(&session, &plan);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&blockers).map_err(anyhow::Error::from)?);
        return Ok(0);
    }
    if blockers.is_empty() {
        println!("Nothing blocked: every task is completed");
        return Ok(0);
    }
    for b in &blockers {
        let layer = b.layer.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
        let why = match &b.reason {
            BlockReason::Failed { error } => format!("failed: {error}"),
            BlockReason::WaitingOnDependencies { pending } => {
                format!("waiting on {}", pending.join(", "))
            }
            BlockReason::WaitingOnResource { resource, holder } => {
                format!("{resource} held by {holder}")
            }
            BlockReason::InProgress { status } => format!("in progress ({status})"),
            BlockReason::Runnable => "runnable".to_string(),
        };
        println!("[layer {layer}] {:<12} {why}", b.task_id);
    }
    Ok(0)
}

pub fn handle_reset(args: ResetArgs, ctx: &AppContext) -> Result<i32, CliError> {
    let plan = Plan::load_from_file(&args.plan)?;
    if ctx.state().checkpoints().clear(&plan.plan_id)? {
        tracing::info!(plan_id = %plan.plan_id, "checkpoint cleared");
        println!("Checkpoint for {} removed", plan.plan_id);
    } else {
        println!("No checkpoint for {}", plan.plan_id);
    }
    Ok(0)
}

use anyhow::Context;
use serde_json::json;
use strata_core::error::CliError;
use strata_core::plan::{load_tasks, Plan, PlanBuilder};

use super::cli::{LayersArgs, OutputFormat, PlanArgs};

pub fn handle_plan(args: PlanArgs) -> Result<i32, CliError> {
    let tasks = load_tasks(&args.tasks)?;
    let spec = std::fs::read(&args.spec)
        .with_context(|| format!("Failed to read spec {}", args.spec.display()))?;
    let name = args.name.clone().unwrap_or_else(|| {
        args.tasks
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plan".to_string())
    });

    let plan = PlanBuilder::new(name).build(tasks, &spec)?;
    tracing::info!(
        plan_id = %plan.plan_id,
        tasks = plan.total_tasks(),
        layers = plan.layers.len(),
        implicit = plan.implicit_dependencies.len(),
        "plan built"
    );

    match &args.out {
        Some(out) => {
            plan.save_to_file(out)?;
            eprintln!(
                "Plan {} written to {} ({} tasks, {} layers)",
                plan.plan_id,
                out.display(),
                plan.total_tasks(),
                plan.layers.len()
            );
            eprint!("{}", layers_text(&plan));
        }
        None => println!("{}", plan.to_json()?),
    }
    Ok(0)
}

pub fn handle_layers(args: LayersArgs) -> Result<i32, CliError> {
    let plan = Plan::load_from_file(&args.plan)?;
    match args.format {
        OutputFormat::Text => print!("{}", layers_text(&plan)),
        OutputFormat::Jsonl => {
            for (idx, layer) in plan.layers.iter().enumerate() {
                println!("{}", json!({ "layer": idx, "tasks": layer }));
            }
        }
    }
    Ok(0)
}

pub fn layers_text(plan: &Plan) -> String {
    let mut out = String::new();
    for (idx, layer) in plan.layers.iter().enumerate() {
        out.push_str(&format!("Layer {}: {}\n", idx, layer.join(", ")));
    }
    for edge in &plan.implicit_dependencies {
        let resources: Vec<String> = edge.resources.iter().map(|r| r.key()).collect();
        out.push_str(&format!(
            "  {} after {} (shares {})\n",
            edge.task_id,
            edge.depends_on,
            resources.join(", ")
        ));
    }
    out
}

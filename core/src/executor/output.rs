//! Fallback lifecycle output used when no renderer plugin is installed.

use chrono::Local;
use serde::{Deserialize, Serialize};

use super::types::{ExecutionOpts, ExecutionReport, TaskResult};

/// One JSONL line of run lifecycle output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub v: i32,
    #[serde(rename = "type")]
    pub event_type: String,
    pub ts: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LifecycleEvent {
    pub fn new(event_type: &str, run_id: &str) -> Self {
        Self {
            v: 1,
            event_type: event_type.to_string(),
            ts: Local::now().to_rfc3339(),
            run_id: run_id.to_string(),
            task_id: None,
            error: None,
            code: None,
            metadata: None,
        }
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

pub fn emit_json(ev: &LifecycleEvent) {
    if let Ok(line) = serde_json::to_string(ev) {
        println!("{line}");
    }
}

fn jsonl(opts: &ExecutionOpts) -> bool {
    opts.stream_format == "jsonl"
}

pub fn emit_run_start(
    opts: &ExecutionOpts,
    run_id: &str,
    total_tasks: usize,
    total_layers: usize,
    resumed_from: Option<usize>,
) {
    if jsonl(opts) {
        emit_json(&LifecycleEvent::new("run.start", run_id).metadata(serde_json::json!({
            "total_tasks": total_tasks,
            "total_layers": total_layers,
            "resumed_from": resumed_from,
        })));
    } else if !opts.quiet {
        match resumed_from {
            Some(layer) => println!(
                "🔁 Resuming at layer {}: {} tasks in {} layers",
                layer, total_tasks, total_layers
            ),
            None => println!(
                "🚀 Starting execution: {} tasks in {} layers",
                total_tasks, total_layers
            ),
        }
    }
}

/// Execution plan (JSONL, or text when verbose)
pub fn emit_execution_plan(opts: &ExecutionOpts, run_id: &str, layers: &[Vec<String>]) {
    if jsonl(opts) {
        let total_tasks: usize = layers.iter().map(|l| l.len()).sum();
        emit_json(&LifecycleEvent::new("executor.plan", run_id).metadata(serde_json::json!({
            "layers": layers,
            "total_tasks": total_tasks,
        })));
    } else if opts.verbose {
        println!("📋 Execution Plan:");
        for (i, layer) in layers.iter().enumerate() {
            println!("  Layer {}: {}", i, layer.join(", "));
        }
        println!();
    }
}

pub fn emit_layer_start(opts: &ExecutionOpts, run_id: &str, layer: usize, task_ids: &[String]) {
    if jsonl(opts) {
        emit_json(&LifecycleEvent::new("layer.start", run_id).metadata(serde_json::json!({
            "layer": layer,
            "tasks": task_ids,
        })));
    } else if opts.verbose && !opts.quiet {
        println!("▶ Layer {} ({} tasks)", layer, task_ids.len());
    }
}

pub fn emit_layer_end(opts: &ExecutionOpts, run_id: &str, layer: usize, success: bool) {
    if jsonl(opts) {
        emit_json(&LifecycleEvent::new("layer.end", run_id).metadata(serde_json::json!({
            "layer": layer,
            "success": success,
        })));
    }
}

pub fn emit_task_start(opts: &ExecutionOpts, run_id: &str, task_id: &str, layer: usize) {
    if jsonl(opts) {
        emit_json(
            &LifecycleEvent::new("task.start", run_id)
                .task(task_id)
                .metadata(serde_json::json!({ "layer": layer })),
        );
    } else if opts.verbose && !opts.quiet {
        println!("  ⏳ Starting task: {}", task_id);
    }
}

pub fn emit_task_waiting(opts: &ExecutionOpts, run_id: &str, task_id: &str, blocked_on: &[String]) {
    if jsonl(opts) {
        emit_json(
            &LifecycleEvent::new("task.waiting", run_id)
                .task(task_id)
                .metadata(serde_json::json!({ "blocked_on": blocked_on })),
        );
    } else if opts.verbose && !opts.quiet {
        println!("  🔒 {} waiting on {}", task_id, blocked_on.join(", "));
    }
}

pub fn emit_task_complete(opts: &ExecutionOpts, run_id: &str, result: &TaskResult) {
    if jsonl(opts) {
        let mut event = LifecycleEvent::new("task.end", run_id)
            .task(&result.task_id)
            .metadata(serde_json::json!({
                "status": result.status,
                "duration_ms": result.duration_ms,
                "lock_wait_ms": result.lock_wait_ms,
            }));
        event.code = Some(if result.is_success() { 0 } else { 1 });
        event.error = result.failure.as_ref().map(|f| f.message.clone());
        emit_json(&event);
    } else if !opts.quiet && (opts.verbose || result.is_failure()) {
        let icon = if result.is_success() { "✅" } else { "❌" };
        match &result.failure {
            Some(f) => println!("  {} Task {}: {}", icon, result.task_id, f.message),
            None => println!("  {} Task {}: {}ms", icon, result.task_id, result.duration_ms),
        }
    }
}

pub fn emit_run_end(opts: &ExecutionOpts, run_id: &str, report: &ExecutionReport) {
    let done = report.completed.len() + report.preloaded.len();
    let total = done + report.failed.len() + report.skipped.len();

    if jsonl(opts) {
        let mut event = LifecycleEvent::new("run.end", run_id).metadata(serde_json::json!({
            "status": report.status,
            "completed": done,
            "failed": report.failed.len(),
            "skipped": report.skipped.len(),
            "duration_ms": report.duration_ms,
        }));
        event.code = Some(if report.is_success() { 0 } else { 1 });
        emit_json(&event);
    } else if !opts.quiet {
        let icon = if report.is_success() { "✅" } else { "❌" };
        println!(
            "\n{} Execution finished: {}/{} tasks completed in {}ms",
            icon, done, total, report.duration_ms
        );
    }
}

pub fn emit_warning(opts: &ExecutionOpts, run_id: &str, task_id: Option<&str>, message: &str) {
    if jsonl(opts) {
        let mut event = LifecycleEvent::new("warning", run_id);
        event.task_id = task_id.map(str::to_string);
        event.error = Some(message.to_string());
        emit_json(&event);
    } else if !opts.quiet {
        let task_prefix = task_id.map(|id| format!("[{}] ", id)).unwrap_or_default();
        println!("⚠️  {}{}", task_prefix, message);
    }
}

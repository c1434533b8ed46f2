use strata_core::executor::traits::{OutputRendererPlugin, RenderEvent};
use strata_core::executor::TaskRunStatus;

pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn status_word(&self, status: TaskRunStatus) -> &'static str {
        match (status, self.ascii_only) {
            (TaskRunStatus::Completed, true) => "OK",
            (TaskRunStatus::Completed, false) => "✅ COMPLETED",
            (TaskRunStatus::Failed, true) => "FAIL",
            (TaskRunStatus::Failed, false) => "❌ FAILED",
            (TaskRunStatus::Skipped, true) => "SKIP",
            (TaskRunStatus::Skipped, false) => "⏭ SKIPPED",
        }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                plan_id,
                total_tasks,
                total_layers,
                resumed_from,
            } => {
                let mut line = format!(
                    "RUN START {} (plan {}, tasks: {}, layers: {})",
                    run_id, plan_id, total_tasks, total_layers
                );
                if let Some(layer) = resumed_from {
                    line.push_str(&format!(", resuming at layer {}", layer));
                }
                line
            }
            RenderEvent::Plan { run_id, layers } => {
                let mut out = format!("PLAN {}:", run_id);
                for (idx, layer) in layers.iter().enumerate() {
                    out.push_str(&format!("\n  layer {}: {}", idx, layer.join(", ")));
                }
                out
            }
            RenderEvent::LayerStart {
                run_id,
                layer,
                task_ids,
            } => format!(
                "LAYER START {} (layer {}, tasks: {})",
                run_id,
                layer,
                task_ids.join(", ")
            ),
            RenderEvent::TaskStart {
                run_id,
                task_id,
                layer,
            } => format!("TASK START {} (layer {}, task {})", run_id, layer, task_id),
            RenderEvent::TaskWaiting {
                run_id,
                task_id,
                blocked_on,
            } => format!(
                "TASK WAITING {} (task {}, blocked on {})",
                run_id,
                task_id,
                blocked_on.join(", ")
            ),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                result,
            } => {
                let mut line = format!(
                    "TASK END {} (task {}, status {}, duration {}ms, lock wait {}ms)",
                    run_id,
                    task_id,
                    self.status_word(result.status),
                    result.duration_ms,
                    result.lock_wait_ms
                );
                if let Some(failure) = &result.failure {
                    line.push_str(&format!(": {}", failure.message));
                }
                line
            }
            RenderEvent::LayerEnd {
                run_id,
                layer,
                success,
            } => format!(
                "LAYER END {} (layer {}, {})",
                run_id,
                layer,
                if *success { "ok" } else { "failed" }
            ),
            RenderEvent::RunEnd { run_id, report } => format!(
                "RUN END {} (completed {}, preloaded {}, failed {}, skipped {}, duration {}ms)",
                run_id,
                report.completed.len(),
                report.preloaded.len(),
                report.failed.len(),
                report.skipped.len(),
                report.duration_ms
            ),
        }
    }
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        println!("{}", self.format_event(event));
    }
}

use serde_json::json;
use strata_core::executor::traits::{OutputRendererPlugin, RenderEvent};
use strata_core::executor::LifecycleEvent;

pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn to_event(&self, event: &RenderEvent) -> LifecycleEvent {
        let run_id = event.run_id();
        match event {
            RenderEvent::RunStart {
                plan_id,
                total_tasks,
                total_layers,
                resumed_from,
                ..
            } => LifecycleEvent::new("run.start", run_id).metadata(json!({
                "plan_id": plan_id,
                "total_tasks": total_tasks,
                "total_layers": total_layers,
                "resumed_from": resumed_from,
            })),
            RenderEvent::Plan { layers, .. } => {
                let total_tasks: usize = layers.iter().map(Vec::len).sum();
                LifecycleEvent::new("executor.plan", run_id).metadata(json!({
                    "layers": layers,
                    "total_tasks": total_tasks,
                }))
            }
            RenderEvent::LayerStart { layer, task_ids, .. } => {
                LifecycleEvent::new("layer.start", run_id).metadata(json!({
                    "layer": layer,
                    "tasks": task_ids,
                }))
            }
            RenderEvent::TaskStart { task_id, layer, .. } => {
                LifecycleEvent::new("task.start", run_id)
                    .task(task_id)
                    .metadata(json!({ "layer": layer }))
            }
            RenderEvent::TaskWaiting {
                task_id, blocked_on, ..
            } => LifecycleEvent::new("task.waiting", run_id)
                .task(task_id)
                .metadata(json!({ "blocked_on": blocked_on })),
            RenderEvent::TaskComplete { task_id, result, .. } => {
                let mut ev = LifecycleEvent::new("task.end", run_id)
                    .task(task_id)
                    .metadata(json!({
                        "status": result.status,
                        "duration_ms": result.duration_ms,
                        "lock_wait_ms": result.lock_wait_ms,
                        "files": result.outcome.as_ref().map(|o| o.outputs()).unwrap_or_default(),
                        "failure_kind": result.failure.as_ref().map(|f| f.kind),
                    }));
                if let Some(failure) = &result.failure {
                    ev.error = Some(failure.message.clone());
                    ev.code = Some(i32::from(failure.to_error().error_code().as_u16()));
                }
                ev
            }
            RenderEvent::LayerEnd { layer, success, .. } => {
                LifecycleEvent::new("layer.end", run_id).metadata(json!({
                    "layer": layer,
                    "success": success,
                }))
            }
            RenderEvent::RunEnd { report, .. } => {
                LifecycleEvent::new("run.end", run_id).metadata(json!({
                    "status": report.status,
                    "completed": report.completed.len(),
                    "preloaded": report.preloaded.len(),
                    "failed": report.failed,
                    "skipped": report.skipped,
                    "failed_layer": report.failed_layer,
                    "duration_ms": report.duration_ms,
                    "peak_parallelism": report.stats.peak_parallelism,
                }))
            }
        }
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn render(&self, event: &RenderEvent) {
        let ev = self.to_event(event);
        let line = if self.pretty_print {
            serde_json::to_string_pretty(&ev)
        } else {
            serde_json::to_string(&ev)
        };
        println!("{}", line.unwrap_or_else(|_| "{}".into()));
    }
}

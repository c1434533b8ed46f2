use crate::executor::types::{ExecutionReport, TaskResult};

/// 输出渲染器插件（控制输出格式）
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn supports_streaming(&self) -> bool {
        false
    }
    fn render(&self, event: &RenderEvent);
}

/// 渲染事件（统一事件类型）
#[derive(Debug, Clone)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        plan_id: String,
        total_tasks: usize,
        total_layers: usize,
        resumed_from: Option<usize>,
    },
    Plan {
        run_id: String,
        layers: Vec<Vec<String>>,
    },
    LayerStart {
        run_id: String,
        layer: usize,
        task_ids: Vec<String>,
    },
    TaskStart {
        run_id: String,
        task_id: String,
        layer: usize,
    },
    /// 任务因资源锁被阻塞
    TaskWaiting {
        run_id: String,
        task_id: String,
        blocked_on: Vec<String>,
    },
    TaskComplete {
        run_id: String,
        task_id: String,
        result: TaskResult,
    },
    LayerEnd {
        run_id: String,
        layer: usize,
        success: bool,
    },
    RunEnd {
        run_id: String,
        report: ExecutionReport,
    },
}

impl RenderEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStart { run_id, .. }
            | Self::Plan { run_id, .. }
            | Self::LayerStart { run_id, .. }
            | Self::TaskStart { run_id, .. }
            | Self::TaskWaiting { run_id, .. }
            | Self::TaskComplete { run_id, .. }
            | Self::LayerEnd { run_id, .. }
            | Self::RunEnd { run_id, .. } => run_id,
        }
    }
}

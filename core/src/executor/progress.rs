use std::collections::BTreeMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Terminal progress for a layered plan run.
///
/// Three tiers: the plan bar counts finished tasks across every layer, the
/// layer bar counts the current layer's tasks, and each pending task of the
/// current layer gets a spinner until it finishes or the layer closes.
/// Tasks restored from a checkpoint start out counted on the plan bar.
pub struct ProgressMonitor {
    multi: MultiProgress,
    plan_bar: ProgressBar,
    layer_bar: Option<ProgressBar>,
    task_bars: BTreeMap<String, ProgressBar>,
    enabled: bool,
}

fn spinner_style() -> Option<ProgressStyle> {
    ProgressStyle::default_spinner()
        .template("    {spinner:.green} {msg}")
        .ok()
        .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
}

impl ProgressMonitor {
    pub fn new(total_tasks: usize, restored: usize, enabled: bool) -> Self {
        let multi = MultiProgress::new();
        if !enabled {
            return Self {
                multi,
                plan_bar: ProgressBar::hidden(),
                layer_bar: None,
                task_bars: BTreeMap::new(),
                enabled: false,
            };
        }

        let plan_bar = multi.add(ProgressBar::new(total_tasks as u64));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks {msg}")
        {
            plan_bar.set_style(style.progress_chars("█▓▒░  "));
        }
        plan_bar.set_position(restored as u64);
        if restored > 0 {
            plan_bar.set_message(format!("({restored} from checkpoint)"));
        }

        Self {
            multi,
            plan_bar,
            layer_bar: None,
            task_bars: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Open a layer: a fresh layer bar and one spinner per pending task.
    pub fn begin_layer(&mut self, layer: usize, total_layers: usize, pending: &[String]) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new(pending.len() as u64));
        if let Ok(style) = ProgressStyle::default_bar().template("  layer {msg} {pos}/{len}") {
            bar.set_style(style);
        }
        bar.set_message(format!("{}/{}", layer + 1, total_layers));
        if let Some(previous) = self.layer_bar.replace(bar) {
            previous.finish_and_clear();
        }

        for id in pending {
            let spinner = self.multi.add(ProgressBar::new_spinner());
            if let Some(style) = spinner_style() {
                spinner.set_style(style);
            }
            spinner.set_message(format!("⏳ {id}"));
            spinner.enable_steady_tick(Duration::from_millis(100));
            self.task_bars.insert(id.clone(), spinner);
        }
    }

    /// Show a task as blocked on a lock held by `held_by`
    pub fn waiting(&self, task_id: &str, held_by: &str) {
        if let Some(bar) = self.task_bars.get(task_id) {
            bar.set_message(format!("🔒 {task_id} (waiting on {held_by})"));
        }
    }

    pub fn complete_task(&mut self, task_id: &str, success: bool, duration_ms: u64) {
        if !self.enabled {
            return;
        }
        if let Some(bar) = self.task_bars.remove(task_id) {
            let icon = if success { "✅" } else { "❌" };
            bar.finish_with_message(format!("{icon} {task_id} ({duration_ms}ms)"));
        }
        if let Some(layer) = &self.layer_bar {
            layer.inc(1);
        }
        self.plan_bar.inc(1);
    }

    /// Close the current layer. Tasks that never ran lose their spinner.
    pub fn end_layer(&mut self, success: bool) {
        if !self.enabled {
            return;
        }
        for (id, bar) in std::mem::take(&mut self.task_bars) {
            bar.finish_with_message(format!("⏭ {id} (not started)"));
        }
        if let Some(layer) = &self.layer_bar {
            let mark = if success { "done" } else { "halted" };
            layer.finish_with_message(format!("{} {mark}", layer.message()));
        }
    }

    pub fn finish(&self, success: bool) {
        if !self.enabled {
            return;
        }
        let msg = if success {
            "✅ plan completed"
        } else {
            "❌ plan halted"
        };
        self.plan_bar.finish_with_message(msg.to_string());
    }

    pub fn pending_spinners(&self) -> usize {
        self.task_bars.len()
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in std::mem::take(&mut self.task_bars) {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disabled_monitor_tracks_nothing() {
        let mut monitor = ProgressMonitor::new(3, 0, false);
        monitor.begin_layer(0, 2, &ids(&["T1"]));
        monitor.waiting("T1", "T0");
        monitor.complete_task("T1", true, 100);
        monitor.end_layer(true);
        monitor.finish(true);
        assert_eq!(monitor.pending_spinners(), 0);
    }

    #[test]
    fn test_halted_layer_clears_unstarted_tasks() {
        let mut monitor = ProgressMonitor::new(5, 2, true);
        monitor.begin_layer(1, 3, &ids(&["T2", "T3", "T6"]));
        assert_eq!(monitor.pending_spinners(), 3);

        monitor.complete_task("T2", true, 10);
        monitor.complete_task("T3", false, 12);
        assert_eq!(monitor.pending_spinners(), 1);

        monitor.end_layer(false);
        assert_eq!(monitor.pending_spinners(), 0);
        monitor.finish(false);
    }
}

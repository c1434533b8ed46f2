use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ExecutorError;

use super::checksum::spec_checksum;
use super::graph::DependencyGraph;
use super::types::{Plan, Task};

/// Builds a finalized [`Plan`] from task descriptors.
///
/// Steps: add tasks, validate explicit dependencies, add implicit conflict
/// edges, reject cycles, then layer.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    name: String,
}

impl PlanBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn build(&self, tasks: Vec<Task>, spec: &[u8]) -> Result<Plan, ExecutorError> {
        let mut graph = DependencyGraph::new();
        for task in tasks {
            graph.add_task(task)?;
        }
        graph.validate_dependencies()?;
        graph.detect_resource_conflicts();

        let cycles = graph.detect_cycles();
        if !cycles.is_empty() {
            return Err(ExecutorError::Cycle { cycles });
        }

        let layers = graph.generate_execution_layers()?;
        let plan = Plan {
            plan_id: Uuid::new_v4().to_string(),
            name: self.name.clone(),
            created_at: Utc::now(),
            spec_checksum: spec_checksum(spec),
            implicit_dependencies: graph.implicit_dependencies(),
            tasks: graph.tasks(),
            layers,
        };

        tracing::info!(
            plan_id = %plan.plan_id,
            tasks = plan.tasks.len(),
            layers = plan.layers.len(),
            implicit = plan.implicit_dependencies.len(),
            "plan built"
        );

        Ok(plan)
    }
}

/// Task descriptor file: either a bare array or `{"tasks": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    List(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

pub fn parse_tasks(json: &str) -> anyhow::Result<Vec<Task>> {
    let file: TaskFile = serde_json::from_str(json).context("Invalid task descriptor JSON")?;
    Ok(match file {
        TaskFile::List(tasks) | TaskFile::Wrapped { tasks } => tasks,
    })
}

pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<Task>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks from {}", path.display()))?;
    parse_tasks(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::checksum::checksums_match;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_worked_scenario() {
        let tasks = parse_tasks(
            r#"{"tasks": [
                {"id": "T1", "resources": {"tables": ["profiles"]}},
                {"id": "T2", "resources": {"tables": ["profiles"]}},
                {"id": "T3", "dependencies": ["T1"]},
                {"id": "T4", "dependencies": ["T2", "T3"]},
                {"id": "T5"}
            ]}"#,
        )
        .unwrap();

        let plan = PlanBuilder::new("profiles").build(tasks, b"spec v1").unwrap();
        assert_eq!(
            plan.layers,
            vec![
                vec!["T1".to_string(), "T5".to_string()],
                vec!["T2".to_string(), "T3".to_string()],
                vec!["T4".to_string()],
            ]
        );
        assert_eq!(plan.implicit_dependencies.len(), 1);
        assert!(checksums_match(&plan.spec_checksum, &spec_checksum(b"spec v1")));
        assert_eq!(
            plan.tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["T1", "T2", "T3", "T4", "T5"]
        );
        plan.verify().unwrap();
    }

    #[test]
    fn test_build_rejects_cycle_before_layering() {
        let tasks = vec![
            Task::new("a", "A").depends_on(["b"]),
            Task::new("b", "B").depends_on(["a"]),
        ];
        let err = PlanBuilder::default().build(tasks, b"").unwrap_err();
        assert!(matches!(err, ExecutorError::Cycle { ref cycles } if !cycles.is_empty()));
    }

    #[test]
    fn test_build_rejects_unknown_dependency() {
        let err = PlanBuilder::default()
            .build(vec![Task::new("a", "A").depends_on(["nope"])], b"")
            .unwrap_err();
        assert!(matches!(err, ExecutorError::DependencyNotFound { .. }));
    }

    #[test]
    fn test_plan_json_round_trip() {
        let plan = PlanBuilder::new("rt")
            .build(vec![Task::new("a", "A").with_tables(["users"])], b"x")
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        plan.save_to_file(&path).unwrap();

        let loaded = Plan::load_from_file(&path).unwrap();
        assert_eq!(loaded.plan_id, plan.plan_id);
        assert_eq!(loaded.layers, plan.layers);
        assert_eq!(loaded.tasks, plan.tasks);
    }

    #[test]
    fn test_parse_tasks_accepts_bare_array() {
        let tasks = parse_tasks(r#"[{"id": "only"}]"#).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(parse_tasks("{}").is_err());
    }
}

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// Category of work a task performs. Selects the convention overlay it receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Database,
    Api,
    Service,
    Ui,
    #[default]
    Generic,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Database => "database",
            TaskType::Api => "api",
            TaskType::Service => "service",
            TaskType::Ui => "ui",
            TaskType::Generic => "generic",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exclusive write domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Migration,
    Route,
    Component,
    Function,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Table => "table",
            ResourceKind::Migration => "migration",
            ResourceKind::Route => "route",
            ResourceKind::Component => "component",
            ResourceKind::Function => "function",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Id of the lock every migration-touching task takes. Migrations are globally sequential.
pub const MIGRATION_SEQUENCE: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn migration_sequence() -> Self {
        Self::new(ResourceKind::Migration, MIGRATION_SEQUENCE)
    }

    /// `kind:id`, used as the lock-table key
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Resources a task declares, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migrations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<String>,
}

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.migrations.is_empty()
            && self.routes.is_empty()
            && self.components.is_empty()
            && self.functions.is_empty()
    }

    fn group(&self, kind: ResourceKind) -> &[String] {
        match kind {
            ResourceKind::Table => &self.tables,
            ResourceKind::Migration => &self.migrations,
            ResourceKind::Route => &self.routes,
            ResourceKind::Component => &self.components,
            ResourceKind::Function => &self.functions,
        }
    }

    /// Every declared reference, grouped by kind in declaration order
    pub fn iter(&self) -> impl Iterator<Item = ResourceRef> + '_ {
        [
            ResourceKind::Table,
            ResourceKind::Migration,
            ResourceKind::Route,
            ResourceKind::Component,
            ResourceKind::Function,
        ]
        .into_iter()
        .flat_map(move |kind| {
            self.group(kind)
                .iter()
                .map(move |id| ResourceRef::new(kind, id.clone()))
        })
    }

    pub fn touches_migrations(&self) -> bool {
        !self.migrations.is_empty()
    }

    /// Shared resources between two sets.
    ///
    /// Two migration-touching sets always overlap on the migration sequence,
    /// whatever their migration labels are.
    pub fn overlap(&self, other: &ResourceSet) -> Vec<ResourceRef> {
        let mut shared = BTreeSet::new();

        for kind in [
            ResourceKind::Table,
            ResourceKind::Route,
            ResourceKind::Component,
            ResourceKind::Function,
        ] {
            let theirs = other.group(kind);
            for id in self.group(kind) {
                if theirs.contains(id) {
                    shared.insert(ResourceRef::new(kind, id.clone()));
                }
            }
        }

        if self.touches_migrations() && other.touches_migrations() {
            shared.insert(ResourceRef::migration_sequence());
        }

        shared.into_iter().collect()
    }

    /// Keys claimed through the lock manager: declared references plus the
    /// migration sequence when any migration is declared.
    pub fn lock_keys(&self) -> Vec<ResourceRef> {
        let mut keys: BTreeSet<ResourceRef> = self.iter().collect();
        if self.touches_migrations() {
            keys.insert(ResourceRef::migration_sequence());
        }
        keys.into_iter().collect()
    }
}

/// A unit of declarative work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, rename = "type")]
    pub task_type: TaskType,

    #[serde(default)]
    pub resources: ResourceSet,

    /// Explicit prerequisite task ids
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub estimated_minutes: u32,

    /// Opaque payload handed to the execution callback untouched
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            task_type: TaskType::Generic,
            resources: ResourceSet::default(),
            dependencies: Vec::new(),
            estimated_minutes: 0,
            spec: serde_json::Value::Null,
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn with_migrations<I, S>(mut self, migrations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources
            .migrations
            .extend(migrations.into_iter().map(Into::into));
        self
    }

    pub fn with_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.routes.extend(routes.into_iter().map(Into::into));
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// An edge synthesized from resource overlap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitDependency {
    pub task_id: String,
    pub depends_on: String,
    pub resources: Vec<ResourceRef>,
}

/// A finalized, executable plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,

    #[serde(default)]
    pub name: String,

    pub created_at: DateTime<Utc>,

    /// `sha256:<hex>` of the specification the plan was built from
    pub spec_checksum: String,

    pub tasks: Vec<Task>,

    pub layers: Vec<Vec<String>>,

    #[serde(default)]
    pub implicit_dependencies: Vec<ImplicitDependency>,
}

impl Plan {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn layer_of(&self, id: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.iter().any(|t| t == id))
    }

    /// Explicit and implicit prerequisites of a task
    pub fn all_dependencies(&self, id: &str) -> Vec<String> {
        let mut deps: Vec<String> = self
            .task(id)
            .map(|t| t.dependencies.clone())
            .unwrap_or_default();
        for edge in &self.implicit_dependencies {
            if edge.task_id == id && !deps.contains(&edge.depends_on) {
                deps.push(edge.depends_on.clone());
            }
        }
        deps
    }

    /// Structural check run before execution: layers partition the tasks and
    /// every dependency lands in an earlier layer.
    pub fn verify(&self) -> Result<(), ExecutorError> {
        let mut layer_index: HashMap<&str, usize> = HashMap::new();
        for (idx, layer) in self.layers.iter().enumerate() {
            for id in layer {
                if layer_index.insert(id.as_str(), idx).is_some() {
                    return Err(ExecutorError::Validation(format!(
                        "task '{id}' appears in more than one layer"
                    )));
                }
            }
        }

        for task in &self.tasks {
            if !layer_index.contains_key(task.id.as_str()) {
                return Err(ExecutorError::Validation(format!(
                    "task '{}' is not scheduled in any layer",
                    task.id
                )));
            }
        }
        if layer_index.len() != self.tasks.len() {
            return Err(ExecutorError::Validation(
                "layers reference tasks missing from the plan".to_string(),
            ));
        }

        for task in &self.tasks {
            let own = layer_index[task.id.as_str()];
            for dep in self.all_dependencies(&task.id) {
                let Some(&dep_layer) = layer_index.get(dep.as_str()) else {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: task.id.clone(),
                        missing_dep: dep,
                    });
                };
                if dep_layer >= own {
                    return Err(ExecutorError::Validation(format!(
                        "task '{}' (layer {own}) depends on '{dep}' (layer {dep_layer})",
                        task.id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize plan")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize plan")
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write plan to {:?}", path.as_ref()))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read plan from {:?}", path.as_ref()))?;
        Self::from_json(&json)
    }
}

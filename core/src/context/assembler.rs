use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::plan::{Task, TaskType};

use super::corpus::{Artifact, EntityDef, SchemaCorpus};
use super::entity::{EntityExtractor, VerbEntityExtractor};

/// Outputs of a finished dependency, as seen by its dependents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceMetrics {
    pub slice_bytes: usize,
    pub corpus_bytes: usize,
    /// 0..=100
    pub reduction_percent: f64,
}

impl SliceMetrics {
    /// Sizes are reported as measured; only the percentage is clamped.
    pub fn measure(slice_bytes: usize, corpus_bytes: usize) -> Self {
        let reduction_percent = if corpus_bytes == 0 {
            0.0
        } else {
            ((1.0 - slice_bytes as f64 / corpus_bytes as f64) * 100.0).clamp(0.0, 100.0)
        };
        Self {
            slice_bytes,
            corpus_bytes,
            reduction_percent,
        }
    }
}

/// The part of the corpus one task needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSlice {
    pub task_id: String,
    pub entities: BTreeMap<String, EntityDef>,
    pub policies: Vec<Artifact>,
    pub functions: Vec<Artifact>,
    pub indexes: Vec<Artifact>,
    pub types: Vec<Artifact>,
    pub conventions: BTreeMap<String, serde_json::Value>,
    pub dependencies: Vec<DependencySummary>,
    /// Entities found only through migration labels
    #[serde(default)]
    pub inferred_entities: Vec<String>,
    pub metrics: SliceMetrics,
}

impl ContextSlice {
    pub fn empty(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            ..Default::default()
        }
    }
}

/// Convention overlays for a task type. `core` and `testing` always apply.
pub fn overlays_for(task_type: TaskType) -> Vec<&'static str> {
    let mut overlays = vec!["core", "testing"];
    match task_type {
        TaskType::Database => overlays.push("database"),
        TaskType::Api => overlays.push("api"),
        TaskType::Ui => overlays.push("ui"),
        TaskType::Service => overlays.push("service"),
        TaskType::Generic => {}
    }
    overlays
}

#[derive(Clone)]
pub struct ContextAssembler {
    corpus: Arc<SchemaCorpus>,
    corpus_bytes: usize,
    extractor: Arc<dyn EntityExtractor>,
    expansion_depth: usize,
}

impl ContextAssembler {
    pub fn new(corpus: Arc<SchemaCorpus>) -> Self {
        let corpus_bytes = corpus.serialized_size();
        Self {
            corpus,
            corpus_bytes,
            extractor: Arc::new(VerbEntityExtractor::default()),
            expansion_depth: 1,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_expansion_depth(mut self, depth: usize) -> Self {
        self.expansion_depth = depth;
        self
    }

    pub fn corpus(&self) -> &SchemaCorpus {
        &self.corpus
    }

    /// Compute the context slice for `task`.
    ///
    /// `completed` may hold every finished task; only the task's own explicit
    /// dependencies are carried into the slice.
    pub fn assemble_context_for_task(
        &self,
        task: &Task,
        completed: &HashMap<String, DependencySummary>,
    ) -> ContextSlice {
        let (seeds, inferred_entities) = self.required_entities(task);
        let included = self.expand(seeds);
        let included_lc: BTreeSet<String> =
            included.iter().map(|e| e.to_ascii_lowercase()).collect();

        let mut subset = SchemaCorpus::default();
        for name in &included {
            if let Some(def) = self.corpus.entities.get(name) {
                subset.entities.insert(name.clone(), def.clone());
            }
        }
        subset.policies = select(&self.corpus.policies, &included_lc);
        subset.indexes = select(&self.corpus.indexes, &included_lc);
        subset.types = select(&self.corpus.types, &included_lc);
        subset.functions = self
            .corpus
            .functions
            .iter()
            .filter(|f| f.references_any(&included_lc) || task.resources.functions.contains(&f.name))
            .cloned()
            .collect();
        for overlay in overlays_for(task.task_type) {
            if let Some(conventions) = self.corpus.conventions.get(overlay) {
                subset
                    .conventions
                    .insert(overlay.to_string(), conventions.clone());
            }
        }

        let dependencies: Vec<DependencySummary> = task
            .dependencies
            .iter()
            .filter_map(|id| completed.get(id).cloned())
            .collect();

        let metrics = SliceMetrics::measure(subset.serialized_size(), self.corpus_bytes);

        tracing::debug!(
            task_id = %task.id,
            entities = subset.entities.len(),
            dependencies = dependencies.len(),
            reduction_percent = metrics.reduction_percent,
            "context assembled"
        );

        ContextSlice {
            task_id: task.id.clone(),
            entities: subset.entities,
            policies: subset.policies,
            functions: subset.functions,
            indexes: subset.indexes,
            types: subset.types,
            conventions: subset.conventions,
            dependencies,
            inferred_entities,
            metrics,
        }
    }

    /// Declared tables, plus entities inferred from migration labels that the
    /// task did not already declare.
    fn required_entities(&self, task: &Task) -> (BTreeSet<String>, Vec<String>) {
        let mut seeds: BTreeSet<String> = task
            .resources
            .tables
            .iter()
            .map(|t| self.canonical(t))
            .collect();

        let mut inferred = Vec::new();
        for label in &task.resources.migrations {
            if let Some(name) = self.extractor.extract(label) {
                let name = self.canonical(&name);
                if seeds.insert(name.clone()) {
                    inferred.push(name);
                }
            }
        }

        (seeds, inferred)
    }

    fn canonical(&self, name: &str) -> String {
        self.corpus
            .resolve(name)
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string())
    }

    /// Breadth-first relationship traversal, `expansion_depth` hops
    fn expand(&self, seeds: BTreeSet<String>) -> BTreeSet<String> {
        let mut frontier: Vec<String> = seeds.iter().cloned().collect();
        let mut included = seeds;

        for _ in 0..self.expansion_depth {
            let mut next = Vec::new();
            for entity in &frontier {
                for neighbor in self.corpus.neighbors(entity) {
                    if included.insert(neighbor.clone()) {
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        included
    }
}

fn select(artifacts: &[Artifact], entities: &BTreeSet<String>) -> Vec<Artifact> {
    artifacts
        .iter()
        .filter(|a| a.references_any(entities))
        .cloned()
        .collect()
}

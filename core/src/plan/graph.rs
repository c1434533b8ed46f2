use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

use super::types::{ImplicitDependency, ResourceRef, Task};

/// Why one task must run after another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyKind {
    Explicit,
    ResourceConflict { resources: Vec<ResourceRef> },
}

/// Task dependency graph (DAG once validated)
///
/// Implicit edges point from the later-added task to the earlier-added one,
/// so insertion order decides which of two conflicting tasks runs first.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Task nodes: task_id -> Task
    pub nodes: HashMap<String, Task>,

    /// Dependency edges: task_id -> list of dependencies (explicit, then implicit)
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Edge annotations keyed by (task_id, dependency)
    kinds: HashMap<(String, String), DependencyKind>,

    /// Original insertion order (tie-breaker for conflicts)
    insertion_order: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct graph from task list, explicit edges only
    pub fn from_tasks(tasks: &[Task]) -> Result<Self, ExecutorError> {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_task(task.clone())?;
        }
        Ok(graph)
    }

    /// Register a node and its explicit dependency set
    pub fn add_task(&mut self, task: Task) -> Result<(), ExecutorError> {
        if self.nodes.contains_key(&task.id) {
            return Err(ExecutorError::DuplicateTaskId(task.id));
        }

        let task_id = task.id.clone();
        let mut dependencies: Vec<String> = Vec::with_capacity(task.dependencies.len());
        for dep in &task.dependencies {
            if !dependencies.contains(dep) {
                dependencies.push(dep.clone());
            }
        }

        for dep in &dependencies {
            self.reverse_edges
                .entry(dep.clone())
                .or_default()
                .push(task_id.clone());
            self.kinds
                .insert((task_id.clone(), dep.clone()), DependencyKind::Explicit);
        }

        self.edges.insert(task_id.clone(), dependencies);
        self.nodes.insert(task_id.clone(), task);
        self.insertion_order.push(task_id);

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tasks in insertion order
    pub fn tasks(&self) -> Vec<Task> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect()
    }

    pub fn dependency_kind(&self, task_id: &str, dependency: &str) -> Option<&DependencyKind> {
        self.kinds
            .get(&(task_id.to_string(), dependency.to_string()))
    }

    /// Check all explicit dependencies exist
    pub fn validate_dependencies(&self) -> Result<(), ExecutorError> {
        for task_id in &self.insertion_order {
            for dep in self.edges.get(task_id).into_iter().flatten() {
                if !self.nodes.contains_key(dep) {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Add implicit edges between tasks that share resources.
    ///
    /// For every pair the later-added task depends on the earlier one. A pair that
    /// already has a direct edge is left alone, which makes the pass idempotent. A
    /// pair where the earlier task already (transitively) waits for the later one
    /// is already serialized; adding the reverse edge would only fabricate a cycle.
    ///
    /// Returns the edges added by this call.
    pub fn detect_resource_conflicts(&mut self) -> Vec<ImplicitDependency> {
        let mut added = Vec::new();
        let order = self.insertion_order.clone();

        for (i, later) in order.iter().enumerate() {
            for earlier in &order[..i] {
                let (Some(later_task), Some(earlier_task)) =
                    (self.nodes.get(later), self.nodes.get(earlier))
                else {
                    continue;
                };

                let shared = earlier_task.resources.overlap(&later_task.resources);
                if shared.is_empty() || self.has_edge(later, earlier) {
                    continue;
                }
                if self.reaches(earlier, later) {
                    tracing::debug!(
                        task_id = %later,
                        other = %earlier,
                        "conflict already ordered by dependencies"
                    );
                    continue;
                }

                added.push(ImplicitDependency {
                    task_id: later.clone(),
                    depends_on: earlier.clone(),
                    resources: shared,
                });
            }

            // Apply this task's edges before examining the next one so later
            // reachability checks see them.
            for edge in added.iter().filter(|e| &e.task_id == later) {
                self.edges
                    .entry(edge.task_id.clone())
                    .or_default()
                    .push(edge.depends_on.clone());
                self.reverse_edges
                    .entry(edge.depends_on.clone())
                    .or_default()
                    .push(edge.task_id.clone());
                self.kinds.insert(
                    (edge.task_id.clone(), edge.depends_on.clone()),
                    DependencyKind::ResourceConflict {
                        resources: edge.resources.clone(),
                    },
                );
            }
        }

        if !added.is_empty() {
            tracing::debug!(count = added.len(), "implicit dependencies added");
        }
        added
    }

    /// All implicit edges currently in the graph, in insertion order
    pub fn implicit_dependencies(&self) -> Vec<ImplicitDependency> {
        let mut out = Vec::new();
        for task_id in &self.insertion_order {
            for dep in self.edges.get(task_id).into_iter().flatten() {
                if let Some(DependencyKind::ResourceConflict { resources }) =
                    self.dependency_kind(task_id, dep)
                {
                    out.push(ImplicitDependency {
                        task_id: task_id.clone(),
                        depends_on: dep.clone(),
                        resources: resources.clone(),
                    });
                }
            }
        }
        out
    }

    fn has_edge(&self, task_id: &str, dependency: &str) -> bool {
        self.edges
            .get(task_id)
            .map(|deps| deps.iter().any(|d| d == dependency))
            .unwrap_or(false)
    }

    /// Whether `from` (transitively) depends on `to`
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from.to_string()];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            for dep in self.edges.get(&node).into_iter().flatten() {
                if dep == to {
                    return true;
                }
                stack.push(dep.clone());
            }
        }
        false
    }

    /// Detect circular dependencies using DFS with a recursion stack
    ///
    /// Each cycle is returned as the ordered path closing on its first node,
    /// e.g. `[a, b, a]`. Empty when the graph is acyclic.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut stack = Vec::new();
        let mut cycles = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) {
                self.dfs_cycles(task_id, &mut visited, &mut on_stack, &mut stack, &mut cycles);
            }
        }

        cycles
    }

    fn dfs_cycles(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        stack: &mut Vec<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node.to_string());
        on_stack.insert(node.to_string());
        stack.push(node.to_string());

        for dep in self.edges.get(node).into_iter().flatten() {
            if !self.nodes.contains_key(dep) {
                continue;
            }

            // Dependency in current path: back edge closes a cycle
            if on_stack.contains(dep) {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(dep.clone());
                    cycles.push(cycle);
                }
                continue;
            }

            if !visited.contains(dep) {
                self.dfs_cycles(dep, visited, on_stack, stack, cycles);
            }
        }

        stack.pop();
        on_stack.remove(node);
    }

    /// Layer tasks using Kahn's algorithm
    ///
    /// Returns execution layers where tasks in the same layer can run in parallel.
    /// Each layer is sorted by task id.
    ///
    /// # Algorithm
    ///
    /// 1. Calculate in-degree for all nodes
    /// 2. Find all nodes with in-degree 0 (first layer)
    /// 3. Remove these nodes and update in-degrees
    /// 4. Repeat until all nodes processed
    ///
    /// # Time Complexity
    ///
    /// O(V log V + E) where V = number of tasks, E = number of dependencies
    pub fn generate_execution_layers(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(self.nodes.len());

        // edges[A] = [B, C] means A depends on B and C, so A's in-degree = 2
        for task_id in self.nodes.keys() {
            let degree = self
                .edges
                .get(task_id)
                .map(|deps| deps.iter().filter(|d| self.nodes.contains_key(*d)).count())
                .unwrap_or(0);
            in_degree.insert(task_id.as_str(), degree);
        }

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| id.to_string())
            .collect();
        current.sort();

        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();

            let mut next = Vec::new();
            for task_id in &current {
                for dependent in self.reverse_edges.get(task_id).into_iter().flatten() {
                    let Some(degree) = in_degree.get_mut(dependent.as_str()) else {
                        continue;
                    };
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
            next.sort();

            layers.push(std::mem::replace(&mut current, next));
        }

        // Defensive: nodes left over means a cycle slipped past detect_cycles
        if processed != self.nodes.len() {
            let mut cycles = self.detect_cycles();
            if cycles.is_empty() {
                let mut stuck: Vec<String> = in_degree
                    .into_iter()
                    .filter(|(_, degree)| *degree > 0)
                    .map(|(id, _)| id.to_string())
                    .collect();
                stuck.sort();
                cycles.push(stuck);
            }
            return Err(ExecutorError::Cycle { cycles });
        }

        Ok(layers)
    }
}

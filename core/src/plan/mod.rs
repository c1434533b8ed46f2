//! Plan construction: task descriptors in, ordered parallel layers out.
//!
//! ```text
//! Vec<Task>
//!   ↓
//! DependencyGraph::add_task()            explicit edges
//!   ↓
//! DependencyGraph::detect_resource_conflicts()   implicit edges (later → earlier)
//!   ↓
//! DependencyGraph::detect_cycles()       must be empty
//!   ↓
//! DependencyGraph::generate_execution_layers() → Vec<Vec<String>>
//!   ↓
//! Plan { layers, spec_checksum, .. }
//! ```

mod builder;
pub mod checksum;
mod graph;
mod types;

pub use builder::{load_tasks, parse_tasks, PlanBuilder};
pub use checksum::{checksum_file, checksums_match, spec_checksum};
pub use graph::{DependencyGraph, DependencyKind};
pub use types::{
    ImplicitDependency, Plan, ResourceKind, ResourceRef, ResourceSet, Task, TaskType,
    MIGRATION_SEQUENCE,
};

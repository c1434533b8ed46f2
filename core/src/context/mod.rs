//! Per-task context slicing over the shared schema/convention corpus.

mod assembler;
mod corpus;
mod entity;

pub use assembler::{overlays_for, ContextAssembler, ContextSlice, DependencySummary, SliceMetrics};
pub use corpus::{Artifact, ColumnDef, EntityDef, SchemaCorpus};
pub use entity::{EntityExtractor, VerbEntityExtractor};

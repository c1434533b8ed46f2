use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,

    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub data_type: String,

    /// Foreign-key style reference to another entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    #[serde(default)]
    pub columns: Vec<ColumnDef>,

    /// Related entities not expressed through a column
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<String>,
}

impl EntityDef {
    /// Entities this one points at
    pub fn outgoing(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_deref())
            .chain(self.relations.iter().map(String::as_str))
    }
}

/// Policy, function, index or type definition tied to entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,

    #[serde(default)]
    pub references: Vec<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub body: serde_json::Value,
}

impl Artifact {
    pub fn references_any(&self, entities: &BTreeSet<String>) -> bool {
        self.references
            .iter()
            .any(|r| entities.contains(&r.to_ascii_lowercase()))
    }
}

/// Shared schema and convention corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCorpus {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDef>,
    #[serde(default)]
    pub policies: Vec<Artifact>,
    #[serde(default)]
    pub functions: Vec<Artifact>,
    #[serde(default)]
    pub indexes: Vec<Artifact>,
    #[serde(default)]
    pub types: Vec<Artifact>,
    /// Overlay name -> conventions (`core`, `testing`, `database`, `api`, ...)
    #[serde(default)]
    pub conventions: BTreeMap<String, serde_json::Value>,
}

impl SchemaCorpus {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize schema corpus")
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read corpus from {:?}", path.as_ref()))?;
        Self::from_json(&json)
    }

    /// Load the cached corpus, treating a missing path or file as empty.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load_from_file(p),
            Some(p) => {
                tracing::debug!(path = %p.display(), "corpus cache missing, using empty corpus");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Corpus key matching `name`, ignoring ASCII case
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.entities.get_key_value(name) {
            return Some(key.as_str());
        }
        self.entities
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Entities one relationship hop away, in either direction
    pub fn neighbors(&self, entity: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();

        if let Some(def) = self.entities.get(entity) {
            for target in def.outgoing() {
                if let Some(key) = self.resolve(target) {
                    out.insert(key.to_string());
                }
            }
        }

        for (name, def) in &self.entities {
            if def.outgoing().any(|t| t.eq_ignore_ascii_case(entity)) {
                out.insert(name.clone());
            }
        }

        out.remove(entity);
        out
    }

    /// Serialized size in bytes, the unit of the slice reduction metric
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

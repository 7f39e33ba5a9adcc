//! Stage catalog: immutable, shared-read stage configuration.
//!
//! The catalog is loaded once (from a JSON document or from the built-in
//! defaults), validated eagerly, and then only ever read. Any number of
//! sessions may hold the same `Arc<StageCatalog>` without synchronization.

mod types;

pub use types::{DifficultyTier, RubricDimension, StageConfig, StageId, TerminationRule};

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};

/// Ordered, validated set of interview stages.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    stages: Vec<StageConfig>,
}

#[derive(Deserialize)]
struct CatalogDocument {
    stages: Vec<StageConfig>,
}

impl StageCatalog {
    /// Build a catalog from an ordered stage list, validating every entry.
    pub fn new(stages: Vec<StageConfig>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::composition("catalog contains no stages"));
        }
        for stage in &stages {
            stage.validate()?;
        }
        let mut ids: Vec<StageId> = stages.iter().map(|s| s.id).collect();
        ids.sort_by_key(|id| id.as_str());
        ids.dedup();
        if ids.len() != stages.len() {
            return Err(Error::composition("catalog lists a stage twice"));
        }
        Ok(Self { stages })
    }

    /// Parse and validate a catalog from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::new(doc.stages)
    }

    /// Load a catalog from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::composition(format!("failed to read catalog file: {}", e)))?;
        let catalog = Self::from_json_str(&raw)?;
        info!(stages = catalog.stages.len(), "stage catalog loaded");
        Ok(catalog)
    }

    /// Look up a stage's configuration.
    pub fn stage_for(&self, stage_id: StageId) -> Result<&StageConfig> {
        self.stages
            .iter()
            .find(|s| s.id == stage_id)
            .ok_or_else(|| Error::unknown_stage(stage_id.as_str()))
    }

    /// The stage following `current` in catalog order, or `None` at the
    /// final stage (or if `current` is not in the catalog).
    pub fn next_stage(&self, current: StageId) -> Option<StageId> {
        let idx = self.stages.iter().position(|s| s.id == current)?;
        self.stages.get(idx + 1).map(|s| s.id)
    }

    /// First stage in catalog order.
    pub fn first_stage(&self) -> StageId {
        self.stages[0].id
    }

    /// All stage identifiers, in order.
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Test-only constructor that skips validation, for exercising the
    /// start-time guard against malformed stages.
    #[cfg(test)]
    pub(crate) fn from_stages_unchecked(stages: Vec<StageConfig>) -> Self {
        Self { stages }
    }
}

impl Default for StageCatalog {
    /// The built-in three-stage interview: screening, technical, behavioral.
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig::screening(),
                StageConfig::technical(),
                StageConfig::behavioral(),
            ],
        }
    }
}

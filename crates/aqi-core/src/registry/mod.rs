//! Model registry
//!
//! The normalized result of loading a model archive: the models that can be
//! invoked, their recorded metrics, the default tag and the feature schema
//! they were trained on. Populated once by [`RegistryLoader`], read-only
//! afterwards, so it can be shared across request handlers behind an `Arc`.

mod archive;
mod loader;

#[cfg(test)]
mod tests;

pub use archive::ArchiveLayout;
pub use loader::{ArchiveInfo, RegistryLoader};

use crate::models::{FeatureSchema, ModelPerformance, RecordedPerformance};
use crate::predictor::ModelHandle;
use serde::Serialize;
use serde_json::Value;

/// Metrics installed when an archive carries none of its own
pub const FALLBACK_PERFORMANCE: [(&str, ModelPerformance); 4] = [
    ("rf", ModelPerformance::new(0.9401, 1.94, 3.2, 5.8)),
    ("et", ModelPerformance::new(0.9463, 1.96, 3.1, 5.9)),
    ("gbr", ModelPerformance::new(0.9615, 2.11, 2.9, 6.2)),
    ("xgboost", ModelPerformance::new(0.6, 10.0, 15.0, 25.0)),
];

/// Default tag installed together with [`FALLBACK_PERFORMANCE`]
pub const FALLBACK_DEFAULT_TAG: &str = "gradient_boosting";

/// UI-facing model tags and the registry keys they stand for
pub const UI_MODEL_TAGS: [(&str, &str); 4] = [
    ("gradient_boosting", "gbr"),
    ("extra_trees", "et"),
    ("random_forest", "rf"),
    ("xgboost", "xgboost"),
];

/// Map a UI-facing tag to its registry key; other tags map to themselves
pub fn resolve_alias(tag: &str) -> &str {
    UI_MODEL_TAGS
        .iter()
        .find(|(ui, _)| *ui == tag)
        .map(|(_, key)| *key)
        .unwrap_or(tag)
}

/// Registry key for a dashboard model selector; unknown selectors map to `gbr`
pub fn backend_model_tag(tag: &str) -> &'static str {
    let key = resolve_alias(tag);
    UI_MODEL_TAGS
        .iter()
        .map(|(_, internal)| *internal)
        .find(|internal| *internal == key)
        .unwrap_or("gbr")
}

/// UI-facing name for a registry key, if it has one
pub fn ui_name(key: &str) -> Option<&'static str> {
    UI_MODEL_TAGS
        .iter()
        .find(|(_, internal)| *internal == key)
        .map(|(ui, _)| *ui)
}

/// One invocable model
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub key: String,
    pub handle: ModelHandle,
    pub performance: Option<RecordedPerformance>,
}

/// Loader step recorded in [`ModelRegistry::stages`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderStage {
    Read,
    Native,
    Legacy,
    Generic,
}

impl LoaderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderStage::Read => "read",
            LoaderStage::Native => "native",
            LoaderStage::Legacy => "legacy",
            LoaderStage::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageResult {
    /// The stage produced the registry
    Matched,
    /// The archive does not have this layout
    Skipped,
    /// The archive has this layout but nothing usable came out of it
    Failed,
}

impl StageResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageResult::Matched => "matched",
            StageResult::Skipped => "skipped",
            StageResult::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: LoaderStage,
    pub result: StageResult,
    pub detail: Option<String>,
}

/// Normalized, read-only set of loaded models
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<RegistryEntry>,
    performances: Vec<(String, RecordedPerformance)>,
    default_model: String,
    feature_schema: FeatureSchema,
    layout: ArchiveLayout,
    archive: Option<ArchiveInfo>,
    training_info: Option<Value>,
    stages: Vec<StageOutcome>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::fallback()
    }
}

impl ModelRegistry {
    /// Simulation-backed registry: no models, fallback metrics
    pub fn fallback() -> Self {
        Self {
            entries: Vec::new(),
            performances: fallback_performances(),
            default_model: FALLBACK_DEFAULT_TAG.to_string(),
            feature_schema: FeatureSchema::default(),
            layout: ArchiveLayout::Unrecognized,
            archive: None,
            training_info: None,
            stages: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        entries: Vec<RegistryEntry>,
        performances: Vec<(String, RecordedPerformance)>,
        default_model: String,
        feature_schema: FeatureSchema,
        layout: ArchiveLayout,
    ) -> Self {
        Self {
            entries,
            performances,
            default_model,
            feature_schema,
            layout,
            archive: None,
            training_info: None,
            stages: Vec::new(),
        }
    }

    pub(crate) fn with_diagnostics(
        mut self,
        archive: Option<ArchiveInfo>,
        training_info: Option<Value>,
        stages: Vec<StageOutcome>,
    ) -> Self {
        self.archive = archive;
        self.training_info = training_info;
        self.stages = stages;
        self
    }

    /// True when at least one model can be invoked
    pub fn uses_trained_models(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Pick the entry for a tag.
    ///
    /// No tag means the default model. The tag is alias-resolved; a key that
    /// is not registered falls back to the first entry.
    pub fn resolve(&self, tag: Option<&str>) -> Option<&RegistryEntry> {
        let requested = resolve_alias(tag.unwrap_or(&self.default_model));
        self.get(requested).or_else(|| self.entries.first())
    }

    /// Tag used when a caller does not name one
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Recorded metrics, keyed by registry tag, in archive order
    pub fn performances(&self) -> &[(String, RecordedPerformance)] {
        &self.performances
    }

    /// Metrics for `key` as recorded, missing fields left unset
    pub fn recorded_performance(&self, key: &str) -> Option<&RecordedPerformance> {
        self.performances
            .iter()
            .find(|(tag, _)| tag == key)
            .map(|(_, perf)| perf)
    }

    /// Metrics for `key` with missing fields read as zero
    pub fn performance(&self, key: &str) -> Option<ModelPerformance> {
        self.recorded_performance(key).map(RecordedPerformance::or_zero)
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    pub fn layout(&self) -> ArchiveLayout {
        self.layout
    }

    pub fn archive(&self) -> Option<&ArchiveInfo> {
        self.archive.as_ref()
    }

    pub fn training_info(&self) -> Option<&Value> {
        self.training_info.as_ref()
    }

    /// Every loader stage attempted, in order
    pub fn stages(&self) -> &[StageOutcome] {
        &self.stages
    }
}

pub(crate) fn fallback_performances() -> Vec<(String, RecordedPerformance)> {
    FALLBACK_PERFORMANCE
        .iter()
        .map(|(tag, perf)| (tag.to_string(), RecordedPerformance::from(*perf)))
        .collect()
}

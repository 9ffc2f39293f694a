//! Cascading archive loader
//!
//! Reads the archive once and tries each layout decoder in order; the first
//! one that yields models wins. Every failure is recovered here: an
//! unreadable or unrecognized archive produces the simulation-backed
//! fallback registry, never an error.

use super::archive::{decode_generic, decode_legacy, decode_native};
use super::{LoaderStage, ModelRegistry, StageOutcome, StageResult};
use crate::error::CoreError;
use crate::observability::CoreMetrics;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identity of the archive a registry was loaded from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256 of the archive bytes, hex encoded
    pub checksum: String,
}

type Decoder = fn(&Value, &Path) -> Result<Option<ModelRegistry>>;

const CASCADE: [(LoaderStage, Decoder); 3] = [
    (LoaderStage::Native, decode_native),
    (LoaderStage::Legacy, decode_legacy),
    (LoaderStage::Generic, decode_generic),
];

/// Loads a [`ModelRegistry`] from an archive on disk
#[derive(Debug, Clone, Default)]
pub struct RegistryLoader {
    metrics: CoreMetrics,
}

impl RegistryLoader {
    pub fn new(metrics: CoreMetrics) -> Self {
        Self { metrics }
    }

    /// Load the archive at `path`.
    ///
    /// Always returns a usable registry; check
    /// [`ModelRegistry::uses_trained_models`] for whether it holds models.
    pub fn load(&self, path: impl AsRef<Path>) -> ModelRegistry {
        let path = path.as_ref();
        let mut stages = Vec::new();

        let (doc, archive) = match read_archive(path) {
            Ok(read) => {
                self.record(&mut stages, LoaderStage::Read, StageResult::Matched, None);
                read
            }
            Err(e) => {
                warn!(stage = "read", outcome = "failed", error = %e, "Falling back to simulation");
                self.record(&mut stages, LoaderStage::Read, StageResult::Failed, Some(e.to_string()));
                return self.finish(ModelRegistry::fallback().with_diagnostics(None, None, stages));
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let training_info = doc.get("training_info").cloned();
        if let Some(training_info) = &training_info {
            info!(
                training_date = ?training_info.get("training_date"),
                data_samples = ?training_info.get("data_samples"),
                "Archive carries training info"
            );
        }

        for (stage, decode) in CASCADE {
            match decode(&doc, base_dir) {
                Ok(Some(registry)) => {
                    info!(
                        stage = stage.as_str(),
                        outcome = "matched",
                        models = registry.len(),
                        default_model = %registry.default_model(),
                        "Archive layout recognized"
                    );
                    self.record(&mut stages, stage, StageResult::Matched, None);
                    let registry = registry.with_diagnostics(Some(archive), training_info, stages);
                    return self.finish(registry);
                }
                Ok(None) => {
                    debug!(stage = stage.as_str(), outcome = "skipped", "Layout not present");
                    self.record(&mut stages, stage, StageResult::Skipped, None);
                }
                Err(e) => {
                    let detail = format!("{:#}", e);
                    warn!(stage = stage.as_str(), outcome = "failed", error = %detail, "Layout stage failed");
                    self.record(&mut stages, stage, StageResult::Failed, Some(detail));
                }
            }
        }

        warn!(
            error = %CoreError::UnrecognizedArchiveLayout,
            path = %path.display(),
            "Falling back to simulation"
        );
        self.finish(ModelRegistry::fallback().with_diagnostics(Some(archive), training_info, stages))
    }

    fn record(
        &self,
        stages: &mut Vec<StageOutcome>,
        stage: LoaderStage,
        result: StageResult,
        detail: Option<String>,
    ) {
        self.metrics.inc_loader_stage(stage.as_str(), result.as_str());
        stages.push(StageOutcome {
            stage,
            result,
            detail,
        });
    }

    fn finish(&self, registry: ModelRegistry) -> ModelRegistry {
        self.metrics.set_active_registry(
            registry.len(),
            registry.default_model(),
            registry.layout().as_str(),
        );
        registry
    }
}

fn read_archive(path: &Path) -> std::result::Result<(Value, ArchiveInfo), CoreError> {
    let unreadable = |reason: String| CoreError::ArchiveUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
    let doc: Value = serde_json::from_slice(&bytes).map_err(|e| unreadable(e.to_string()))?;

    let info = ArchiveInfo {
        path: path.to_path_buf(),
        size_bytes: bytes.len() as u64,
        checksum: checksum(&bytes),
    };
    debug!(
        path = %info.path.display(),
        size_bytes = info.size_bytes,
        checksum = %info.checksum,
        "Archive read"
    );

    Ok((doc, info))
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

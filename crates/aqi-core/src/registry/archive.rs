//! Archive layout decoders
//!
//! One decoder per known layout. Each returns `Ok(None)` when the document
//! does not have its shape, `Err` when it has the shape but yields nothing
//! usable, and a normalized [`ModelRegistry`] otherwise.

use super::{fallback_performances, ModelRegistry, RegistryEntry, FALLBACK_DEFAULT_TAG};
use crate::models::{FeatureSchema, RecordedPerformance};
use crate::predictor::{ModelHandle, ModelSpec, UnverifiedModel};
use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Archive shape a registry was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveLayout {
    /// `models.<key>.model` entries with optional metadata
    Native,
    /// `final_models` mapping trusted without validation
    LegacyEnsemble,
    /// A bare model, or a mapping scanned for model values
    Generic,
    /// Nothing recognizable; simulation-backed
    Unrecognized,
}

impl ArchiveLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveLayout::Native => "native",
            ArchiveLayout::LegacyEnsemble => "legacy_ensemble",
            ArchiveLayout::Generic => "generic",
            ArchiveLayout::Unrecognized => "unrecognized",
        }
    }
}

/// Key a bare top-level model is registered under
const MAIN_MODEL_KEY: &str = "main_model";

pub(super) fn decode_native(doc: &Value, base_dir: &Path) -> Result<Option<ModelRegistry>> {
    let Some(models) = doc.get("models").and_then(Value::as_object) else {
        return Ok(None);
    };
    debug!(entries = models.len(), "Decoding native archive layout");

    let feature_schema = declared_schema(doc.get("feature_columns"));

    let mut entries = Vec::new();
    let mut performances = Vec::new();

    for (key, info) in models {
        let Some(model) = info.as_object().and_then(|info| info.get("model")) else {
            warn!(model = %key, "Native entry has no 'model' field, skipping");
            continue;
        };

        let handle = match ModelSpec::build_from_value(model, base_dir) {
            Ok(handle) => handle,
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!(model = %key, error = %detail, "Native entry is not invocable, skipping");
                continue;
            }
        };

        let performance = match info.get("performance") {
            Some(perf) => match serde_json::from_value::<RecordedPerformance>(perf.clone()) {
                Ok(perf) => Some(perf),
                Err(e) => {
                    warn!(model = %key, error = %e, "Ignoring malformed performance metadata");
                    None
                }
            },
            None => None,
        };
        if let Some(perf) = performance {
            performances.push((key.clone(), perf));
        }

        debug!(
            model = %key,
            kind = handle.kind(),
            r2_score = performance.and_then(|p| p.r2_score),
            used_tuning = ?info.get("used_tuning"),
            "Registered native model"
        );

        entries.push(RegistryEntry {
            key: key.clone(),
            handle,
            performance,
        });
    }

    if entries.is_empty() {
        bail!("no entry under 'models' exposes a predict capability");
    }

    let default_model = select_best_model(doc.get("best_model"), &entries, &performances);

    Ok(Some(ModelRegistry::from_parts(
        entries,
        performances,
        default_model,
        feature_schema,
        ArchiveLayout::Native,
    )))
}

/// Declared column order, or the default when absent, empty or malformed
fn declared_schema(columns: Option<&Value>) -> FeatureSchema {
    let Some(columns) = columns else {
        return FeatureSchema::default();
    };
    match serde_json::from_value::<Vec<String>>(columns.clone()) {
        Ok(columns) if !columns.is_empty() => FeatureSchema::new(columns),
        Ok(_) => {
            debug!("feature_columns is empty, using default column order");
            FeatureSchema::default()
        }
        Err(e) => {
            warn!(error = %e, "feature_columns is not a list of column names, using default column order");
            FeatureSchema::default()
        }
    }
}

/// Declared best model if it loaded, else highest r2, else the first key
fn select_best_model(
    declared: Option<&Value>,
    entries: &[RegistryEntry],
    performances: &[(String, RecordedPerformance)],
) -> String {
    if let Some(declared) = declared.and_then(Value::as_str) {
        if entries.iter().any(|entry| entry.key == declared) {
            return declared.to_string();
        }
        warn!(best_model = %declared, "Declared best model did not load");
    }

    let mut best_r2 = -1.0;
    let mut best = None;
    for (key, perf) in performances {
        let r2_score = perf.r2_score.unwrap_or(0.0);
        if r2_score > best_r2 {
            best_r2 = r2_score;
            best = Some(key);
        }
    }

    match best {
        Some(key) => key.clone(),
        None => entries[0].key.clone(),
    }
}

pub(super) fn decode_legacy(doc: &Value, base_dir: &Path) -> Result<Option<ModelRegistry>> {
    let Some(final_models) = doc.get("final_models") else {
        return Ok(None);
    };
    let Some(final_models) = final_models.as_object() else {
        bail!("final_models is not a mapping");
    };
    if final_models.is_empty() {
        bail!("final_models is empty");
    }

    let entries = final_models
        .iter()
        .map(|(key, value)| {
            let handle: ModelHandle = match ModelSpec::build_from_value(value, base_dir) {
                Ok(handle) => handle,
                Err(e) => {
                    let detail = format!("{:#}", e);
                    warn!(model = %key, error = %detail, "Registering legacy entry unverified");
                    Arc::new(UnverifiedModel::new(key.clone()))
                }
            };
            RegistryEntry {
                key: key.clone(),
                handle,
                performance: None,
            }
        })
        .collect();

    Ok(Some(ModelRegistry::from_parts(
        entries,
        fallback_performances(),
        FALLBACK_DEFAULT_TAG.to_string(),
        FeatureSchema::default(),
        ArchiveLayout::LegacyEnsemble,
    )))
}

pub(super) fn decode_generic(doc: &Value, base_dir: &Path) -> Result<Option<ModelRegistry>> {
    let entries = if let Ok(handle) = ModelSpec::build_from_value(doc, base_dir) {
        vec![RegistryEntry {
            key: MAIN_MODEL_KEY.to_string(),
            handle,
            performance: None,
        }]
    } else if let Some(map) = doc.as_object() {
        scan_for_models(map, base_dir)
    } else {
        return Ok(None);
    };

    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let default_model = first.key.clone();

    Ok(Some(ModelRegistry::from_parts(
        entries,
        fallback_performances(),
        default_model,
        FeatureSchema::default(),
        ArchiveLayout::Generic,
    )))
}

fn scan_for_models(map: &Map<String, Value>, base_dir: &Path) -> Vec<RegistryEntry> {
    map.iter()
        .filter_map(|(key, value)| {
            let handle = ModelSpec::build_from_value(value, base_dir).ok()?;
            debug!(model = %key, kind = handle.kind(), "Found model in generic archive");
            Some(RegistryEntry {
                key: key.clone(),
                handle,
                performance: None,
            })
        })
        .collect()
}

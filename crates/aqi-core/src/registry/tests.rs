//! Loader cascade scenarios against archive fixtures on disk

use super::*;
use crate::models::{AqiBounds, PredictionPath, CALENDAR_COLUMNS, DEFAULT_FEATURE_COLUMNS};
use crate::observability::CoreMetrics;
use crate::predictor::PredictionExecutor;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn write_archive(dir: &TempDir, doc: &Value) -> PathBuf {
    let path = dir.path().join("aqi_4_models.json");
    fs::write(&path, serde_json::to_vec_pretty(doc).unwrap()).unwrap();
    path
}

fn load(doc: &Value) -> (TempDir, ModelRegistry) {
    let dir = TempDir::new().unwrap();
    let path = write_archive(&dir, doc);
    let registry = RegistryLoader::default().load(&path);
    (dir, registry)
}

fn linear(intercept: f64, n: usize) -> Value {
    json!({"type": "linear", "intercept": intercept, "coefficients": vec![0.0; n]})
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn results(registry: &ModelRegistry) -> Vec<(LoaderStage, StageResult)> {
    registry
        .stages()
        .iter()
        .map(|outcome| (outcome.stage, outcome.result))
        .collect()
}

fn native_archive() -> Value {
    json!({
        "models": {
            "rf": {
                "model": linear(61.0, 14),
                "performance": {"r2_score": 0.94, "mae": 1.9, "rmse": 3.2, "mape": 4.9},
                "used_tuning": true
            },
            "gbr": {
                "model": linear(72.0, 14),
                "performance": {"r2_score": 0.96, "mae": 2.1, "rmse": 3.7, "mape": 5.2}
            },
            "et": {
                "model": {
                    "type": "tree_ensemble",
                    "trees": [{"nodes": [
                        {"feature": 1, "threshold": 6.5, "left": 1, "right": 2},
                        {"value": 55.0},
                        {"value": 95.0}
                    ]}]
                },
                "performance": {"r2_score": 0.95}
            }
        },
        "training_info": {"training_date": "2025-07-01", "data_samples": 18250}
    })
}

#[test]
fn test_native_archive_loads_trained_models() {
    let (_dir, registry) = load(&native_archive());

    assert!(registry.uses_trained_models());
    assert_eq!(registry.layout(), ArchiveLayout::Native);
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["rf", "gbr", "et"]);
    // Highest r2 wins without an explicit best_model
    assert_eq!(registry.default_model(), "gbr");
    assert_eq!(registry.performance("et").unwrap().r2_score, 0.95);
    assert_eq!(registry.performance("et").unwrap().mae, 0.0);
    assert_eq!(registry.recorded_performance("et").unwrap().mae, None);
    assert_eq!(registry.feature_schema().columns(), &DEFAULT_FEATURE_COLUMNS);
    assert_eq!(
        registry.training_info().unwrap()["data_samples"],
        json!(18250)
    );
    assert_eq!(
        results(&registry),
        vec![
            (LoaderStage::Read, StageResult::Matched),
            (LoaderStage::Native, StageResult::Matched)
        ]
    );

    let archive = registry.archive().unwrap();
    assert_eq!(archive.checksum.len(), 64);
    assert!(archive.size_bytes > 0);
}

#[test]
fn test_native_declared_best_model() {
    let mut doc = native_archive();
    doc["best_model"] = json!("et");
    let (_dir, registry) = load(&doc);
    assert_eq!(registry.default_model(), "et");

    // A declared model that did not load is ignored
    doc["best_model"] = json!("lstm");
    let (_dir, registry) = load(&doc);
    assert_eq!(registry.default_model(), "gbr");
}

#[test]
fn test_native_without_metrics_uses_first_key() {
    let doc = json!({
        "models": {
            "xgboost": {"model": linear(80.0, 14)},
            "rf": {"model": linear(60.0, 14)},
            "broken": {"performance": {"r2_score": 0.99}}
        }
    });
    let (_dir, registry) = load(&doc);

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.default_model(), "xgboost");
    assert!(registry.performances().is_empty());
}

#[test]
fn test_native_with_nothing_invocable_falls_through() {
    let doc = json!({"models": {"gbr": {"model": "GradientBoostingRegressor()"}}});
    let (_dir, registry) = load(&doc);

    assert!(!registry.uses_trained_models());
    assert_eq!(registry.layout(), ArchiveLayout::Unrecognized);
    assert_eq!(
        results(&registry),
        vec![
            (LoaderStage::Read, StageResult::Matched),
            (LoaderStage::Native, StageResult::Failed),
            (LoaderStage::Legacy, StageResult::Skipped),
            (LoaderStage::Generic, StageResult::Skipped)
        ]
    );
    assert!(registry.stages()[1].detail.is_some());
}

#[test]
fn test_legacy_archive_is_trusted() {
    let doc = json!({
        "final_models": {
            "gbr": linear(70.0, 14),
            "rf": {"pickled": "opaque"}
        }
    });
    let (_dir, registry) = load(&doc);

    assert!(registry.uses_trained_models());
    assert_eq!(registry.layout(), ArchiveLayout::LegacyEnsemble);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("rf").unwrap().handle.kind(), "unverified");
    assert_eq!(registry.default_model(), FALLBACK_DEFAULT_TAG);
    assert_eq!(registry.performance("gbr").unwrap().r2_score, 0.9615);

    let executor = PredictionExecutor::new(Arc::new(registry), CoreMetrics::new());
    let d = date(2025, 8, 9);
    // Default tag resolves to gbr through the alias table
    assert_eq!(executor.predict_aqi_for_date(d, None), Some(70));
    // The unverified entry fails both attempts
    assert_eq!(executor.predict_aqi_for_date(d, Some("random_forest")), None);
}

#[test]
fn test_empty_legacy_falls_through() {
    let (_dir, registry) = load(&json!({"final_models": {}}));
    assert!(!registry.uses_trained_models());
    assert_eq!(registry.stages()[2].result, StageResult::Failed);
}

#[test]
fn test_single_bare_model() {
    let (_dir, registry) = load(&linear(42.0, 14));

    assert!(registry.uses_trained_models());
    assert_eq!(registry.layout(), ArchiveLayout::Generic);
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["main_model"]);
    assert_eq!(registry.default_model(), "main_model");
    assert_eq!(registry.performance("xgboost").unwrap().mae, 10.0);
}

#[test]
fn test_generic_mapping_is_scanned() {
    let doc = json!({
        "description": "hand exported",
        "seasonal": linear(50.0, 14),
        "weights": [1, 2, 3],
        "baseline": linear(30.0, 14)
    });
    let (_dir, registry) = load(&doc);

    assert_eq!(registry.layout(), ArchiveLayout::Generic);
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["seasonal", "baseline"]);
    assert_eq!(registry.default_model(), "seasonal");
}

#[test]
fn test_unrecognized_mapping_falls_back() {
    let (_dir, registry) = load(&json!({"scaler": {"mean": [1.0]}, "version": 3}));

    assert!(!registry.uses_trained_models());
    assert_eq!(registry.layout(), ArchiveLayout::Unrecognized);
    assert_eq!(registry.default_model(), FALLBACK_DEFAULT_TAG);
    assert_eq!(registry.performances().len(), 4);
    assert!(registry.archive().is_some());
}

#[test]
fn test_missing_archive_falls_back() {
    let dir = TempDir::new().unwrap();
    let registry = RegistryLoader::default().load(dir.path().join("missing.json"));

    assert!(!registry.uses_trained_models());
    assert!(registry.archive().is_none());
    assert_eq!(results(&registry), vec![(LoaderStage::Read, StageResult::Failed)]);
    assert_eq!(registry.performance("gbr").unwrap().rmse, 2.9);
}

#[test]
fn test_corrupt_archive_falls_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("aqi_4_models.json");
    fs::write(&path, b"\x80\x04\x95 not json").unwrap();

    let registry = RegistryLoader::default().load(&path);
    assert!(!registry.uses_trained_models());
    assert_eq!(registry.stages()[0].result, StageResult::Failed);
}

#[test]
fn test_custom_feature_columns_drive_the_row() {
    let doc = json!({
        "feature_columns": ["month", "aqi_lag_1", "humidity"],
        "models": {"gbr": {"model": {
            "type": "linear",
            "intercept": 0.0,
            "coefficients": [10.0, 0.0, 1000.0]
        }}}
    });
    let (_dir, registry) = load(&doc);
    assert_eq!(registry.feature_schema().len(), 3);

    let executor = PredictionExecutor::new(Arc::new(registry), CoreMetrics::new());
    // month * 10; the unknown humidity column is zero
    let prediction = executor.predict(date(2025, 7, 4), None);
    assert_eq!(prediction.aqi, 70);
    assert_eq!(prediction.path, PredictionPath::FullFeatures);
}

#[test]
fn test_empty_feature_columns_use_default_order() {
    let doc = json!({
        "feature_columns": [],
        "models": {"gbr": {"model": linear(64.0, 14)}}
    });
    let (_dir, registry) = load(&doc);
    assert!(registry.uses_trained_models());
    assert_eq!(registry.feature_schema().len(), DEFAULT_FEATURE_COLUMNS.len());

    let executor = PredictionExecutor::new(Arc::new(registry), CoreMetrics::new());
    assert_eq!(executor.predict_aqi_for_date(date(2025, 3, 1), None), Some(64));
    assert_eq!(
        executor.predict(date(2025, 3, 1), None).path,
        PredictionPath::FullFeatures
    );
}

#[test]
fn test_malformed_feature_columns_keep_native_models() {
    for columns in [Value::Null, json!("month"), json!([1, 2, 3]), json!({"a": 1})] {
        let doc = json!({
            "feature_columns": columns,
            "models": {"gbr": {"model": linear(64.0, 14)}}
        });
        let (_dir, registry) = load(&doc);

        assert_eq!(registry.layout(), ArchiveLayout::Native);
        assert!(registry.uses_trained_models());
        assert_eq!(registry.feature_schema().len(), DEFAULT_FEATURE_COLUMNS.len());
        assert_eq!(
            results(&registry),
            vec![
                (LoaderStage::Read, StageResult::Matched),
                (LoaderStage::Native, StageResult::Matched),
            ]
        );
    }
}

#[test]
fn test_minimal_retry_with_loaded_model() {
    let doc = json!({"models": {"gbr": {"model": {
        "type": "linear",
        "intercept": 20.0,
        "coefficients": [0.0, 5.0, 0.0, 0.0, 0.0, 0.0]
    }}}});
    let (_dir, registry) = load(&doc);
    let executor = PredictionExecutor::new(Arc::new(registry), CoreMetrics::new());

    // Only the month coefficient is set, and month is second of the calendar columns
    assert_eq!(CALENDAR_COLUMNS[1], "month");
    let prediction = executor.predict(date(2025, 9, 30), Some("gbr"));
    assert_eq!(prediction.path, PredictionPath::MinimalFeatures);
    assert_eq!(prediction.aqi, 65);
}

#[test]
fn test_tree_model_output_stays_in_bounds() {
    let (_dir, registry) = load(&native_archive());
    let executor = PredictionExecutor::new(Arc::new(registry), CoreMetrics::new());

    let mut day = date(2025, 1, 1);
    for _ in 0..59 {
        let aqi = executor.predict_aqi_for_date(day, Some("extra_trees")).unwrap();
        assert!(AqiBounds::MODEL.contains(aqi));
        // January and February sit left of the month split
        assert_eq!(aqi, 55);
        day = day.succ_opt().unwrap();
    }
}

#[test]
fn test_alias_resolution() {
    assert_eq!(resolve_alias("gradient_boosting"), "gbr");
    assert_eq!(resolve_alias("random_forest"), "rf");
    assert_eq!(resolve_alias("extra_trees"), "et");
    assert_eq!(resolve_alias("xgboost"), "xgboost");
    assert_eq!(resolve_alias("lstm"), "lstm");
    assert_eq!(ui_name("et"), Some("extra_trees"));
    assert_eq!(ui_name("main_model"), None);
}

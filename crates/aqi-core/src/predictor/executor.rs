//! Prediction executor
//!
//! Runs one prediction through the fallback chain: the selected model on the
//! full feature row, then the same model on the calendar-only row, then
//! (for callers that need a number) the deterministic simulation.

use super::{finalize_prediction, FeatureBuilder};
use crate::error::ModelError;
use crate::models::{AqiBounds, FeatureRow, Prediction, PredictionPath, CALENDAR_COLUMNS};
use crate::observability::CoreMetrics;
use crate::registry::{resolve_alias, ModelRegistry, RegistryEntry};
use crate::simulation::SimulationEngine;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Executes predictions against a loaded registry
#[derive(Debug, Clone)]
pub struct PredictionExecutor {
    registry: Arc<ModelRegistry>,
    features: FeatureBuilder,
    simulation: SimulationEngine,
    metrics: CoreMetrics,
}

impl PredictionExecutor {
    pub fn new(registry: Arc<ModelRegistry>, metrics: CoreMetrics) -> Self {
        let features = FeatureBuilder::new(registry.feature_schema().clone());
        Self {
            registry,
            features,
            simulation: SimulationEngine::new(),
            metrics,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn simulation(&self) -> &SimulationEngine {
        &self.simulation
    }

    /// Model path only: full row, then calendar-only row, then `None`.
    ///
    /// `None` means no real-model prediction is available; it is not an
    /// error.
    pub fn predict_with_model(&self, date: NaiveDate, tag: Option<&str>) -> Option<Prediction> {
        let Some(entry) = self.registry.resolve(tag) else {
            debug!(date = %date, "No model registered");
            return None;
        };

        let row = self.features.build(date);
        let full_error = match invoke(entry, &row) {
            Ok(aqi) => return Some(self.model_prediction(entry, aqi, PredictionPath::FullFeatures)),
            Err(e) => e,
        };

        warn!(
            path = PredictionPath::MinimalFeatures.as_str(),
            model = %entry.key,
            date = %date,
            error = %full_error,
            "Full feature row rejected, retrying with calendar features"
        );

        let minimal = row
            .select(&CALENDAR_COLUMNS)
            .and_then(|minimal| invoke(entry, &minimal));

        match minimal {
            Ok(aqi) => Some(self.model_prediction(entry, aqi, PredictionPath::MinimalFeatures)),
            Err(e) => {
                warn!(
                    path = "none",
                    model = %entry.key,
                    date = %date,
                    error = %e,
                    "Calendar feature retry failed"
                );
                None
            }
        }
    }

    /// Model path when trained models are active, simulation otherwise.
    ///
    /// Returns `None` only when models are active and every attempt failed.
    pub fn predict_aqi_for_date(&self, date: NaiveDate, tag: Option<&str>) -> Option<i64> {
        let start = Instant::now();

        let prediction = if self.registry.uses_trained_models() {
            self.predict_with_model(date, tag)?
        } else {
            self.simulate(date, tag)
        };

        self.record(prediction.path, start);
        Some(prediction.aqi)
    }

    /// Always produces a prediction, substituting the simulation for `None`
    pub fn predict(&self, date: NaiveDate, tag: Option<&str>) -> Prediction {
        let start = Instant::now();

        let prediction = if self.registry.uses_trained_models() {
            self.predict_with_model(date, tag)
                .unwrap_or_else(|| self.simulate(date, tag))
        } else {
            self.simulate(date, tag)
        };

        self.record(prediction.path, start);
        prediction
    }

    /// Model path when trained models are active, `fallback` otherwise.
    ///
    /// For callers whose simulation differs from the per-tag one, such as
    /// the hour-aware chart helpers.
    pub fn predict_or_else<F>(&self, date: NaiveDate, tag: Option<&str>, fallback: F) -> i64
    where
        F: FnOnce() -> i64,
    {
        let start = Instant::now();

        if self.registry.uses_trained_models() {
            if let Some(prediction) = self.predict_with_model(date, tag) {
                self.record(prediction.path, start);
                return prediction.aqi;
            }
        }

        let aqi = fallback();
        self.record(PredictionPath::Simulation, start);
        aqi
    }

    fn record(&self, path: PredictionPath, start: Instant) {
        self.metrics.inc_predictions(path.as_str());
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
    }

    fn simulate(&self, date: NaiveDate, tag: Option<&str>) -> Prediction {
        let aqi = self.simulation.model_aqi(date, tag.map(resolve_alias));
        debug!(
            path = PredictionPath::Simulation.as_str(),
            model = ?tag,
            date = %date,
            aqi = aqi,
            "Simulated prediction"
        );
        Prediction::simulated(aqi)
    }

    fn model_prediction(&self, entry: &RegistryEntry, aqi: i64, path: PredictionPath) -> Prediction {
        debug!(
            path = path.as_str(),
            model = %entry.key,
            kind = entry.handle.kind(),
            aqi = aqi,
            "Model prediction"
        );
        Prediction {
            aqi,
            source: path.source(),
            path,
            model: Some(entry.key.clone()),
        }
    }
}

fn invoke(entry: &RegistryEntry, row: &FeatureRow) -> Result<i64, ModelError> {
    let raw = entry.handle.predict(row)?;
    finalize_prediction(raw, AqiBounds::MODEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureSchema, PredictionSource};
    use crate::predictor::{AqiModel, LinearModel, UnverifiedModel};
    use crate::registry::{ArchiveLayout, FALLBACK_DEFAULT_TAG};

    /// Accepts only rows of one width
    #[derive(Debug)]
    struct WidthBound {
        width: usize,
        value: f64,
    }

    impl AqiModel for WidthBound {
        fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
            if row.len() != self.width {
                return Err(ModelError::ShapeMismatch {
                    expected: self.width,
                    actual: row.len(),
                });
            }
            Ok(self.value)
        }

        fn kind(&self) -> &'static str {
            "width_bound"
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn handle<M: AqiModel + 'static>(model: M) -> Arc<dyn AqiModel> {
        Arc::new(model)
    }

    fn executor(models: Vec<(&str, Arc<dyn AqiModel>)>) -> PredictionExecutor {
        let entries: Vec<RegistryEntry> = models
            .into_iter()
            .map(|(key, handle)| RegistryEntry {
                key: key.to_string(),
                handle,
                performance: None,
            })
            .collect();
        let default_model = entries
            .first()
            .map(|entry| entry.key.clone())
            .unwrap_or_else(|| FALLBACK_DEFAULT_TAG.to_string());
        let registry = ModelRegistry::from_parts(
            entries,
            Vec::new(),
            default_model,
            FeatureSchema::default(),
            ArchiveLayout::Generic,
        );
        PredictionExecutor::new(Arc::new(registry), CoreMetrics::new())
    }

    #[test]
    fn test_full_feature_prediction() {
        let exec = executor(vec![("gbr", handle(WidthBound { width: 14, value: 72.4 }))]);
        let prediction = exec.predict_with_model(date(2025, 8, 9), Some("gradient_boosting")).unwrap();

        assert_eq!(prediction.aqi, 72);
        assert_eq!(prediction.path, PredictionPath::FullFeatures);
        assert_eq!(prediction.source, PredictionSource::RealModel);
        assert_eq!(prediction.model.as_deref(), Some("gbr"));
    }

    #[test]
    fn test_minimal_feature_retry_is_surfaced() {
        let exec = executor(vec![("rf", handle(WidthBound { width: 6, value: 88.0 }))]);
        let prediction = exec.predict_with_model(date(2025, 8, 9), Some("rf")).unwrap();

        assert_eq!(prediction.aqi, 88);
        assert_eq!(prediction.path, PredictionPath::MinimalFeatures);
        assert_eq!(exec.predict_aqi_for_date(date(2025, 8, 9), Some("rf")), Some(88));
    }

    #[test]
    fn test_double_failure_returns_none_then_simulates() {
        let exec = executor(vec![("gbr", handle(UnverifiedModel::new("gbr")))]);
        let d = date(2025, 8, 9);

        assert_eq!(exec.predict_with_model(d, None), None);
        assert_eq!(exec.predict_aqi_for_date(d, None), None);

        let prediction = exec.predict(d, None);
        assert_eq!(prediction.path, PredictionPath::Simulation);
        assert_eq!(prediction.aqi, SimulationEngine::new().model_aqi(d, None));
    }

    #[test]
    fn test_unknown_tag_uses_first_model() {
        let exec = executor(vec![
            ("et", handle(WidthBound { width: 14, value: 40.0 })),
            ("gbr", handle(WidthBound { width: 14, value: 90.0 })),
        ]);
        let prediction = exec.predict(date(2025, 1, 2), Some("lstm"));
        assert_eq!(prediction.model.as_deref(), Some("et"));
        assert_eq!(prediction.aqi, 40);
    }

    #[test]
    fn test_model_output_is_clamped() {
        let linear = LinearModel {
            intercept: 10_000.0,
            coefficients: vec![0.0; 14],
        };
        let exec = executor(vec![("gbr", handle(linear))]);
        assert_eq!(exec.predict_aqi_for_date(date(2025, 6, 1), None), Some(150));
    }

    #[test]
    fn test_every_served_path_is_counted() {
        let exec = executor(vec![("rf", handle(WidthBound { width: 6, value: 88.0 }))]);
        let metrics = CoreMetrics::new();
        let d = date(2025, 8, 9);

        let minimal_before = metrics.predictions_served("minimal_features");
        assert_eq!(exec.predict_aqi_for_date(d, Some("rf")), Some(88));
        assert_eq!(exec.predict_or_else(d, Some("rf"), || 0), 88);
        assert!(metrics.predictions_served("minimal_features") >= minimal_before + 2);

        let broken = executor(vec![("gbr", handle(UnverifiedModel::new("gbr")))]);
        let simulated_before = metrics.predictions_served("simulation");
        assert_eq!(broken.predict_or_else(d, None, || 42), 42);
        assert!(metrics.predictions_served("simulation") > simulated_before);
    }

    #[test]
    fn test_no_models_routes_to_simulation() {
        let exec = executor(Vec::new());
        let d = date(2024, 12, 25);

        let aqi = exec.predict_aqi_for_date(d, Some("random_forest"));
        assert_eq!(aqi, Some(SimulationEngine::new().model_aqi(d, Some("rf"))));
        assert!(AqiBounds::MODEL.contains(aqi.unwrap()));
        assert_eq!(exec.predict(d, Some("random_forest")).path, PredictionPath::Simulation);
    }
}

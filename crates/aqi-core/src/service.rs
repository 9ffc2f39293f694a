//! Core-to-caller contract
//!
//! [`AqiSystem`] is what the host process holds: it owns the active registry
//! through its executor and answers every dashboard question with a number,
//! falling back to the simulation wherever a model cannot answer.

use crate::breakpoints::AqiCategory;
use crate::error::Result;
use crate::models::{
    Concentrations, ModelPerformance, Pollutant, PollutantPeak, Prediction, RecordedPerformance,
};
use crate::observability::CoreMetrics;
use crate::predictor::PredictionExecutor;
use crate::registry::{
    backend_model_tag, ModelRegistry, RegistryLoader, FALLBACK_DEFAULT_TAG, UI_MODEL_TAGS,
};
use crate::simulation::series::{self, Granularity};
use crate::simulation::{main_pollutant, SimulationEngine};
use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Metrics shown on the dashboard when the registry has none for a model
pub const DASHBOARD_PERFORMANCE: [(&str, ModelPerformance); 4] = [
    ("gbr", ModelPerformance::new(0.962, 2.1, 3.7, 5.2)),
    ("et", ModelPerformance::new(0.946, 1.9, 3.1, 4.8)),
    ("rf", ModelPerformance::new(0.940, 1.9, 3.2, 4.9)),
    ("xgboost", ModelPerformance::new(0.600, 10.0, 15.0, 25.0)),
];

/// Metrics of one dashboard model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    /// UI-facing tag
    pub model: &'static str,
    /// Registry key
    pub backend_model: &'static str,
    pub performance: ModelPerformance,
}

/// The prediction core as seen by its host
#[derive(Debug, Clone)]
pub struct AqiSystem {
    executor: PredictionExecutor,
    loader: RegistryLoader,
    metrics: CoreMetrics,
}

impl Default for AqiSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl AqiSystem {
    /// A system in simulation mode until [`AqiSystem::load_models`] runs
    pub fn new() -> Self {
        let metrics = CoreMetrics::new();
        Self {
            executor: PredictionExecutor::new(Arc::new(ModelRegistry::fallback()), metrics.clone()),
            loader: RegistryLoader::new(metrics.clone()),
            metrics,
        }
    }

    /// Load a model archive, replacing the active registry.
    ///
    /// Always returns `true`: an unusable archive leaves the system in
    /// simulation mode with fallback metrics.
    pub fn load_models(&mut self, path: impl AsRef<Path>) -> bool {
        let registry = self.loader.load(path);
        info!(
            layout = registry.layout().as_str(),
            models = registry.len(),
            default_model = %registry.default_model(),
            using_trained_models = registry.uses_trained_models(),
            "Active registry replaced"
        );
        self.executor = PredictionExecutor::new(Arc::new(registry), self.metrics.clone());
        true
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.executor.registry()
    }

    pub fn using_trained_models(&self) -> bool {
        self.registry().uses_trained_models()
    }

    pub fn best_model_tag(&self) -> &str {
        self.registry().default_model()
    }

    pub fn performance_by_tag(&self) -> &[(String, RecordedPerformance)] {
        self.registry().performances()
    }

    /// Integer AQI for a date; never fails
    pub fn predict_aqi(&self, date: NaiveDate, model_tag: Option<&str>) -> i64 {
        self.predict(date, model_tag).aqi
    }

    /// Like [`AqiSystem::predict_aqi`], with provenance
    pub fn predict(&self, date: NaiveDate, model_tag: Option<&str>) -> Prediction {
        self.executor.predict(date, model_tag)
    }

    /// Model path with `None` on failure, simulation when no models are active
    pub fn predict_aqi_for_date(&self, date: NaiveDate, model_tag: Option<&str>) -> Option<i64> {
        self.executor.predict_aqi_for_date(date, model_tag)
    }

    pub fn prediction_source(&self) -> String {
        if self.using_trained_models() {
            format!("Real ML Models ({} loaded)", self.registry().len())
        } else {
            "Mathematical Simulation".to_string()
        }
    }

    pub fn main_pollutant_for(&self, date: NaiveDate) -> &'static str {
        main_pollutant(date.month(), self.predict_aqi(date, None))
    }

    pub fn predict_pollutant_concentrations(
        &self,
        date: NaiveDate,
        model_tag: Option<&str>,
    ) -> Concentrations {
        let aqi = self.predict_aqi(date, model_tag);
        self.simulation().pollutant_concentrations(date, aqi)
    }

    pub fn highest_concentration_days(&self, year: i32, month: u32) -> Result<Vec<PollutantPeak>> {
        self.simulation()
            .highest_concentration_days(year, month, |date| self.predict_aqi(date, None))
    }

    /// Hour-offset AQI for chart series.
    ///
    /// Uses the default gradient-boosting model when models are active and
    /// the hour-aware simulation otherwise.
    pub fn request_aqi(&self, date: NaiveDate, offset_hours: u32) -> i64 {
        let target = shift_by_hours(date, offset_hours);
        self.executor
            .predict_or_else(target, Some(FALLBACK_DEFAULT_TAG), || {
                self.simulation().request_aqi(date, offset_hours)
            })
    }

    /// Hour-offset AQI for one dashboard model selector
    pub fn model_request_aqi(&self, date: NaiveDate, model_tag: &str, offset_hours: u32) -> i64 {
        let backend = backend_model_tag(model_tag);
        let target = shift_by_hours(date, offset_hours);
        self.executor.predict_or_else(target, Some(backend), || {
            self.simulation().model_request_aqi(date, backend, offset_hours)
        })
    }

    /// One AQI per day of the date's year
    pub fn daily_aqi_series(&self, date: NaiveDate) -> Vec<i64> {
        let pinned = self.request_aqi(date, 0);
        series::daily_aqi_series(date, pinned, |day| self.chart_aqi(day, 0))
    }

    /// Four AQI samples per month over the twelve months ending at the date
    pub fn weekly_aqi_series(&self, date: NaiveDate) -> Vec<i64> {
        let pinned = self.request_aqi(date, 0);
        series::weekly_aqi_series(date, pinned, |day, offset| self.chart_aqi(day, offset))
    }

    pub fn pollutant_series(
        &self,
        pollutant: Pollutant,
        year: i32,
        month: u32,
        granularity: Granularity,
    ) -> Result<Vec<f64>> {
        series::pollutant_series(pollutant, year, month, granularity)
    }

    /// Metrics of the four dashboard models, registry values first
    pub fn model_performances(&self) -> Vec<ModelSummary> {
        UI_MODEL_TAGS
            .iter()
            .map(|(ui, key)| {
                let defaults = DASHBOARD_PERFORMANCE
                    .iter()
                    .find(|(tag, _)| tag == key)
                    .map(|(_, perf)| *perf)
                    .unwrap_or_default();
                let performance = match self.registry().recorded_performance(key) {
                    Some(recorded) => recorded.or_defaults(&defaults),
                    None => defaults,
                };
                ModelSummary {
                    model: *ui,
                    backend_model: *key,
                    performance,
                }
            })
            .collect()
    }

    pub fn category(&self, aqi: i64) -> AqiCategory {
        AqiCategory::from_aqi(aqi)
    }

    fn simulation(&self) -> &SimulationEngine {
        self.executor.simulation()
    }

    /// Default-model AQI for a chart point, simulated when no model answers
    fn chart_aqi(&self, date: NaiveDate, offset_hours: u32) -> i64 {
        self.executor.predict_or_else(date, None, || {
            self.simulation().request_aqi(date, offset_hours)
        })
    }
}

fn shift_by_hours(date: NaiveDate, offset_hours: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(offset_hours / 24)))
        .unwrap_or(date)
}

//! Observability for the prediction core
//!
//! Provides:
//! - Prometheus metrics for loader stages, prediction paths and latency
//! - Structured process-level log events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, register_int_gauge,
    GaugeVec, Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CoreMetricsInner> = OnceLock::new();

struct CoreMetricsInner {
    loader_stage_total: IntCounterVec,
    predictions_total: IntCounterVec,
    prediction_latency_seconds: Histogram,
    registry_models: IntGauge,
    active_model_info: GaugeVec,
}

impl CoreMetricsInner {
    fn new() -> Self {
        Self {
            loader_stage_total: register_int_counter_vec!(
                "aqi_core_loader_stage_total",
                "Archive loader stage attempts by outcome",
                &["stage", "outcome"]
            )
            .expect("Failed to register loader_stage_total"),

            predictions_total: register_int_counter_vec!(
                "aqi_core_predictions_total",
                "Predictions served, by the executor path that produced them",
                &["path"]
            )
            .expect("Failed to register predictions_total"),

            prediction_latency_seconds: register_histogram!(
                "aqi_core_prediction_latency_seconds",
                "Time spent producing one prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            registry_models: register_int_gauge!(
                "aqi_core_registry_models",
                "Number of models in the active registry"
            )
            .expect("Failed to register registry_models"),

            active_model_info: register_gauge_vec!(
                "aqi_core_active_model_info",
                "Default model and archive layout of the active registry",
                &["model", "layout"]
            )
            .expect("Failed to register active_model_info"),
        }
    }
}

/// Handle to the process-wide core metrics.
///
/// Clones share the same underlying metrics.
#[derive(Debug, Clone)]
pub struct CoreMetrics {
    _private: (),
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CoreMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CoreMetricsInner {
        GLOBAL_METRICS.get_or_init(CoreMetricsInner::new)
    }

    pub fn inc_loader_stage(&self, stage: &str, outcome: &str) {
        self.inner()
            .loader_stage_total
            .with_label_values(&[stage, outcome])
            .inc();
    }

    pub fn inc_predictions(&self, path: &str) {
        self.inner().predictions_total.with_label_values(&[path]).inc();
    }

    /// Predictions counted so far for one path
    pub fn predictions_served(&self, path: &str) -> u64 {
        self.inner().predictions_total.with_label_values(&[path]).get()
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Publish the shape of a freshly loaded registry
    pub fn set_active_registry(&self, models: usize, default_model: &str, layout: &str) {
        let inner = self.inner();
        inner.registry_models.set(models as i64);
        inner.active_model_info.reset();
        inner
            .active_model_info
            .with_label_values(&[default_model, layout])
            .set(1.0);
    }
}

/// Structured logger for process-level events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, model_path: &str, listen: &str) {
        info!(
            event = "server_started",
            service = %self.service,
            version = %version,
            model_path = %model_path,
            listen = %listen,
            "AQI server started"
        );
    }

    /// Log the outcome of loading the model archive
    pub fn log_registry_loaded(
        &self,
        layout: &str,
        models: usize,
        default_model: &str,
        using_trained_models: bool,
    ) {
        if using_trained_models {
            info!(
                event = "registry_loaded",
                service = %self.service,
                layout = %layout,
                models = models,
                default_model = %default_model,
                using_trained_models = true,
                "Model registry loaded"
            );
        } else {
            warn!(
                event = "registry_loaded",
                service = %self.service,
                layout = %layout,
                models = models,
                default_model = %default_model,
                using_trained_models = false,
                "No usable model archive, serving simulated predictions"
            );
        }
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            service = %self.service,
            reason = %reason,
            "AQI server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_metrics_share_one_registry() {
        let metrics = CoreMetrics::new();
        let clone = CoreMetrics::new();

        metrics.inc_loader_stage("native", "matched");
        clone.inc_loader_stage("native", "matched");
        metrics.inc_predictions("simulation");
        metrics.observe_prediction_latency(0.0002);
        metrics.set_active_registry(4, "gbr", "native");

        let inner = metrics.inner();
        assert!(
            inner
                .loader_stage_total
                .with_label_values(&["native", "matched"])
                .get()
                >= 2
        );
        assert!(inner.prediction_latency_seconds.get_sample_count() >= 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("aqi-server");
        assert_eq!(logger.service, "aqi-server");
        logger.log_registry_loaded("unrecognized", 0, "gradient_boosting", false);
    }
}

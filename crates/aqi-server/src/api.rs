//! HTTP API for the dashboard and Prometheus metrics

use aqi_core::registry::{backend_model_tag, ui_name};
use aqi_core::{
    parse_request_date, AqiCategory, AqiSystem, Concentrations, CoreError, ModelSummary,
    PollutantPeak,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Datelike, Days, Local, NaiveDate};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Days covered by the prediction trend, today included
const TREND_DAYS: u64 = 7;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub system: Arc<AqiSystem>,
}

impl AppState {
    pub fn new(system: AqiSystem) -> Self {
        Self {
            system: Arc::new(system),
        }
    }
}

/// Request failure reported to the dashboard
#[derive(Debug)]
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            CoreError::InvalidRequestDate(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub date: NaiveDate,
    pub aqi: i64,
    pub category: AqiCategory,
    pub source: &'static str,
    /// UI-facing model tag
    pub model: &'static str,
    /// Registry key the tag resolved to
    pub backend_model: &'static str,
    pub prediction_source: String,
    /// AQI for the requested day and the six following days
    pub trend: Vec<i64>,
    pub model_performances: Vec<ModelSummary>,
}

#[derive(Debug, Serialize)]
pub struct ConcentrationsResponse {
    pub date: NaiveDate,
    pub concentrations: Concentrations,
}

#[derive(Debug, Serialize)]
pub struct MainPollutantResponse {
    pub date: NaiveDate,
    pub main_pollutant: &'static str,
}

fn request_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw {
        Some(raw) => Ok(parse_request_date(raw)?),
        None => Ok(Local::now().date_naive()),
    }
}

async fn prediction(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let date = request_date(query.date.as_deref())?;
    let selector = query
        .model
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "gbr".to_string());
    let backend_model = backend_model_tag(&selector);
    let system = &state.system;

    let aqi = system.model_request_aqi(date, backend_model, 0);
    let trend = (0..TREND_DAYS)
        .filter_map(|offset| date.checked_add_days(Days::new(offset)))
        .map(|day| system.model_request_aqi(day, backend_model, 0))
        .collect();

    Ok(Json(PredictionResponse {
        date,
        aqi,
        category: system.category(aqi),
        source: if system.using_trained_models() {
            "REAL_ML"
        } else {
            "SIMULATION"
        },
        model: ui_name(backend_model).unwrap_or("gradient_boosting"),
        backend_model,
        prediction_source: system.prediction_source(),
        trend,
        model_performances: system.model_performances(),
    }))
}

async fn concentrations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ConcentrationsResponse>, ApiError> {
    let date = request_date(query.date.as_deref())?;
    let concentrations = state
        .system
        .predict_pollutant_concentrations(date, query.model.as_deref());
    Ok(Json(ConcentrationsResponse {
        date,
        concentrations,
    }))
}

async fn main_pollutant(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<MainPollutantResponse>, ApiError> {
    let date = request_date(query.date.as_deref())?;
    Ok(Json(MainPollutantResponse {
        date,
        main_pollutant: state.system.main_pollutant_for(date),
    }))
}

async fn highest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Vec<PollutantPeak>>, ApiError> {
    let today = Local::now().date_naive();
    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or_else(|| today.month());
    Ok(Json(state.system.highest_concentration_days(year, month)?))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/prediction", get(prediction))
        .route("/api/concentrations", get(concentrations))
        .route("/api/main-pollutant", get(main_pollutant))
        .route("/api/highest", get(highest))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Core data models for the prediction core

use crate::error::{CoreError, ModelError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Feature columns used at training time when the archive declares none
pub const DEFAULT_FEATURE_COLUMNS: [&str; 14] = [
    "year",
    "month",
    "day",
    "weekday",
    "day_of_year",
    "is_weekend",
    "daily_avg_temp",
    "aqi_lag_1",
    "aqi_lag_3",
    "aqi_lag_7",
    "aqi_ma_3",
    "aqi_ma_7",
    "aqi_trend_3",
    "aqi_volatility",
];

/// Calendar-only columns used by the minimal-feature retry
pub const CALENDAR_COLUMNS: [&str; 6] =
    ["year", "month", "day", "weekday", "day_of_year", "is_weekend"];

/// Parse a `YYYY-MM-DD` request date
pub fn parse_request_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidRequestDate(raw.to_string()))
}

/// Closed integer range an AQI value is clamped into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AqiBounds {
    pub min: i64,
    pub max: i64,
}

impl AqiBounds {
    /// Model predictions and per-tag simulation
    pub const MODEL: AqiBounds = AqiBounds { min: 15, max: 150 };
    /// Hour-aware request-level simulation used for chart series
    pub const CHART: AqiBounds = AqiBounds { min: 20, max: 120 };

    /// Clamp a raw value into the range and round half to even
    pub fn clamp_round(&self, raw: f64) -> i64 {
        let clamped = raw.clamp(self.min as f64, self.max as f64);
        clamped.round_ties_even() as i64
    }

    pub fn contains(&self, aqi: i64) -> bool {
        (self.min..=self.max).contains(&aqi)
    }
}

/// Regression metrics for a trained model
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPerformance {
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

impl ModelPerformance {
    pub const fn new(r2_score: f64, mae: f64, rmse: f64, mape: f64) -> Self {
        Self {
            r2_score,
            mae,
            rmse,
            mape,
        }
    }
}

/// Metrics as recorded in an archive, where any field may be missing
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedPerformance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mape: Option<f64>,
}

impl RecordedPerformance {
    /// Fill each missing field from `defaults`
    pub fn or_defaults(&self, defaults: &ModelPerformance) -> ModelPerformance {
        ModelPerformance {
            r2_score: self.r2_score.unwrap_or(defaults.r2_score),
            mae: self.mae.unwrap_or(defaults.mae),
            rmse: self.rmse.unwrap_or(defaults.rmse),
            mape: self.mape.unwrap_or(defaults.mape),
        }
    }

    /// Missing fields read as zero
    pub fn or_zero(&self) -> ModelPerformance {
        self.or_defaults(&ModelPerformance::default())
    }
}

impl From<ModelPerformance> for RecordedPerformance {
    fn from(perf: ModelPerformance) -> Self {
        Self {
            r2_score: Some(perf.r2_score),
            mae: Some(perf.mae),
            rmse: Some(perf.rmse),
            mape: Some(perf.mape),
        }
    }
}

/// Where a prediction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    RealModel,
    Simulation,
}

/// Which executor path produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionPath {
    /// Model invoked with the full trained schema
    FullFeatures,
    /// Model invoked with the six calendar columns after the full row failed
    MinimalFeatures,
    /// Deterministic simulation
    Simulation,
}

impl PredictionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionPath::FullFeatures => "full_features",
            PredictionPath::MinimalFeatures => "minimal_features",
            PredictionPath::Simulation => "simulation",
        }
    }

    pub fn source(&self) -> PredictionSource {
        match self {
            PredictionPath::FullFeatures | PredictionPath::MinimalFeatures => {
                PredictionSource::RealModel
            }
            PredictionPath::Simulation => PredictionSource::Simulation,
        }
    }
}

/// An integer AQI with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub aqi: i64,
    pub source: PredictionSource,
    pub path: PredictionPath,
    /// Registry key of the model used, if any
    pub model: Option<String>,
}

impl Prediction {
    pub fn simulated(aqi: i64) -> Self {
        Self {
            aqi,
            source: PredictionSource::Simulation,
            path: PredictionPath::Simulation,
            model: None,
        }
    }
}

/// Pollutants tracked by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "PM2.5 - Local Conditions")]
    Pm25,
    #[serde(rename = "PM10 Total 0-10um STP")]
    Pm10,
    #[serde(rename = "Carbon monoxide")]
    Co,
    #[serde(rename = "Nitrogen dioxide (NO2)")]
    No2,
    #[serde(rename = "Sulfur dioxide")]
    So2,
    #[serde(rename = "Ozone")]
    O3,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::Co,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::O3,
    ];

    /// Monitoring-network label
    pub fn label(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5 - Local Conditions",
            Pollutant::Pm10 => "PM10 Total 0-10um STP",
            Pollutant::Co => "Carbon monoxide",
            Pollutant::No2 => "Nitrogen dioxide (NO2)",
            Pollutant::So2 => "Sulfur dioxide",
            Pollutant::O3 => "Ozone",
        }
    }

    /// Short code used by the dashboard selectors
    pub fn code(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::Co => "CO",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::O3 => "O3",
        }
    }

    /// Display unit
    pub fn unit(&self) -> &'static str {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => "µg/m³",
            Pollutant::Co => "ppm",
            Pollutant::No2 | Pollutant::So2 | Pollutant::O3 => "ppb",
        }
    }

    /// Display range used by the pollutant chart series
    pub fn display_range(&self) -> (f64, f64) {
        match self {
            Pollutant::Pm25 => (20.0, 65.0),
            Pollutant::Pm10 => (25.0, 75.0),
            Pollutant::No2 => (10.0, 45.0),
            Pollutant::So2 => (8.0, 30.0),
            Pollutant::Co => (0.5, 2.0),
            Pollutant::O3 => (35.0, 75.0),
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Pollutant {
    type Err = String;

    /// Accepts either the short code or the full label, case-insensitively
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        Pollutant::ALL
            .into_iter()
            .find(|p| p.code().eq_ignore_ascii_case(wanted) || p.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown pollutant '{}'", s))
    }
}

/// Simulated concentration per pollutant
pub type Concentrations = BTreeMap<Pollutant, f64>;

/// Day of a month with the highest simulated concentration of a pollutant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutantPeak {
    pub pollutant: Pollutant,
    pub day: u32,
    pub concentration: f64,
    pub unit: &'static str,
    pub aqi: i64,
}

/// Ordered column names a trained model expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema(Vec<String>);

impl FeatureSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_COLUMNS)
    }
}

/// A single numeric record laid out in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl FeatureRow {
    /// Project computed features onto `schema`, in schema order.
    ///
    /// Columns absent from `computed` are 0.0, and non-finite values are
    /// replaced by 0.0.
    pub fn project(schema: &FeatureSchema, computed: &[(&str, f64)]) -> Self {
        let values = schema
            .columns()
            .iter()
            .map(|column| {
                computed
                    .iter()
                    .find(|(name, _)| *name == column.as_str())
                    .map(|(_, value)| *value)
                    .filter(|value| value.is_finite())
                    .unwrap_or(0.0)
            })
            .collect();

        Self {
            columns: schema.columns().to_vec(),
            values,
        }
    }

    /// Sub-row with only `names`, in the given order
    pub fn select(&self, names: &[&str]) -> std::result::Result<FeatureRow, ModelError> {
        let mut columns = Vec::with_capacity(names.len());
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            let value = self
                .get(name)
                .ok_or_else(|| ModelError::MissingColumn(name.to_string()))?;
            columns.push(name.to_string());
            values.push(value);
        }
        Ok(Self { columns, values })
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| self.values[idx])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

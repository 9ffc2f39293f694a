//! Deterministic simulation engine
//!
//! Produces reproducible pseudo-observations when no trained model is
//! available or usable. Each value is a pure function of its inputs: the
//! inputs are folded into a string key, the key seeds a private stream, and
//! the stream is dropped when the call returns.
//!
//! Two AQI formulas coexist on purpose and are kept apart by name:
//! [`SimulationEngine::model_aqi`] (seasonal base `45 + 25·sin`, clamped to
//! [`AqiBounds::MODEL`]) stands in for a model prediction, while
//! [`SimulationEngine::request_aqi`] and
//! [`SimulationEngine::model_request_aqi`] (bases `50 + 25·sin` and
//! `50 + 20·sin`, clamped to [`AqiBounds::CHART`]) feed chart series.

mod seed;
pub mod series;

pub use seed::{seed_for, SeededStream};

use crate::error::{CoreError, Result};
use crate::models::{AqiBounds, Concentrations, Pollutant, PollutantPeak};
use chrono::{Datelike, Months, NaiveDate};
use std::f64::consts::PI;

/// Standard deviation and bias of the per-tag perturbation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagProfile {
    pub std_dev: f64,
    pub bias: f64,
}

/// Perturbation used when simulating a model prediction
pub fn model_tag_profile(tag: Option<&str>) -> TagProfile {
    let (std_dev, bias) = match tag {
        Some("gbr") => (8.0, 0.0),
        Some("rf") => (12.0, -3.0),
        Some("et") => (18.0, 4.0),
        Some("xgboost") => (25.0, 8.0),
        _ => (15.0, 0.0),
    };
    TagProfile { std_dev, bias }
}

/// Perturbation used by the request-level per-model simulation
pub fn request_tag_profile(tag: &str) -> TagProfile {
    let (std_dev, bias) = match tag {
        "gbr" => (5.0, 0.0),
        "rf" => (8.0, -2.0),
        "et" => (12.0, 3.0),
        "xgboost" => (18.0, 5.0),
        _ => (10.0, 0.0),
    };
    TagProfile { std_dev, bias }
}

/// Offset added to the hashed seed of the request-level per-model simulation
fn request_seed_base(tag: &str) -> u64 {
    match tag {
        "gbr" => 1000,
        "rf" => 2000,
        "et" => 3000,
        "xgboost" => 4000,
        _ => 5000,
    }
}

/// Seasonal profile of one pollutant in the highest-concentration scan
#[derive(Debug, Clone, Copy)]
pub struct PeakProfile {
    pub pollutant: Pollutant,
    pub base: f64,
    pub std_dev: f64,
}

/// Pollutants reported by the highest-concentration scan, in report order
pub const PEAK_PROFILES: [PeakProfile; 5] = [
    PeakProfile { pollutant: Pollutant::Pm25, base: 35.0, std_dev: 12.0 },
    PeakProfile { pollutant: Pollutant::O3, base: 65.0, std_dev: 15.0 },
    PeakProfile { pollutant: Pollutant::No2, base: 28.0, std_dev: 10.0 },
    PeakProfile { pollutant: Pollutant::So2, base: 18.0, std_dev: 6.0 },
    PeakProfile { pollutant: Pollutant::Co, base: 1.2, std_dev: 0.4 },
];

/// ISO date string used in every seed key
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `sin(2π·dayOfYear/365)`
pub fn seasonal_factor(date: NaiveDate) -> f64 {
    (2.0 * PI * f64::from(date.ordinal()) / 365.0).sin()
}

/// Round half to even at `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Number of days in a month, `None` for an invalid month
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    next.pred_opt().map(|last| last.day())
}

/// Dominant pollutant label for a month and AQI
pub fn main_pollutant(month: u32, aqi: i64) -> &'static str {
    match month {
        11 | 12 | 1 | 2 => {
            if aqi > 100 {
                "PM2.5 - Winter Pollution"
            } else if aqi > 70 {
                "PM10 Total 0-10um STP"
            } else {
                "PM2.5 - Local Conditions"
            }
        }
        3..=5 => {
            if aqi > 80 {
                "PM10 Total 0-10um STP"
            } else if aqi > 60 {
                "Ozone"
            } else {
                "PM2.5 - Local Conditions"
            }
        }
        6..=9 => {
            if aqi > 90 {
                "PM2.5 - Humid Conditions"
            } else {
                "Nitrogen dioxide (NO2)"
            }
        }
        _ => {
            if aqi > 90 {
                "PM2.5 - Crop Burning"
            } else if aqi > 60 {
                "PM10 Total 0-10um STP"
            } else {
                "Nitrogen dioxide (NO2)"
            }
        }
    }
}

/// Stateless generator of reproducible pseudo-observations
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationEngine;

impl SimulationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Simulated stand-in for a model prediction.
    ///
    /// Keyed by date, or `date-tag` when a tag is given.
    pub fn model_aqi(&self, date: NaiveDate, tag: Option<&str>) -> i64 {
        let key = match tag {
            Some(tag) => format!("{}-{}", date_key(date), tag),
            None => date_key(date),
        };
        let mut stream = SeededStream::from_key(&key);

        let base = 45.0 + 25.0 * seasonal_factor(date);
        let profile = model_tag_profile(tag);
        let variation = stream.normal(0.0, profile.std_dev);

        AqiBounds::MODEL.clamp_round(base + variation + profile.bias)
    }

    /// Hour-aware simulation used for chart series when no model answers
    pub fn request_aqi(&self, date: NaiveDate, offset_hours: u32) -> i64 {
        let key = format!("{}-{}", date_key(date), offset_hours);
        let mut stream = SeededStream::from_key(&key);

        let base = 50.0 + 25.0 * seasonal_factor(date);
        let seasonal_adjustment = match date.month() {
            11 | 12 | 1 | 2 => 15.0,
            6..=9 => -10.0,
            _ => 5.0,
        };
        let variation = stream.normal(0.0, 12.0);
        let hour_effect = f64::from(offset_hours) * 0.3;

        AqiBounds::CHART.clamp_round(base + seasonal_adjustment + variation + hour_effect)
    }

    /// Hour-aware per-model simulation used by the prediction page.
    ///
    /// `tag` is an internal registry key (`gbr`, `rf`, `et`, `xgboost`).
    pub fn model_request_aqi(&self, date: NaiveDate, tag: &str, offset_hours: u32) -> i64 {
        let key = format!("{}-{}-{}", date_key(date), tag, offset_hours);
        let seed = u64::from(seed_for(&key)) + request_seed_base(tag);
        let mut stream = SeededStream::from_seed(seed);

        let base = 50.0 + 20.0 * seasonal_factor(date);
        let profile = request_tag_profile(tag);
        let variation = stream.normal(0.0, profile.std_dev);
        let hour_effect = f64::from(offset_hours) * 0.5;

        AqiBounds::CHART.clamp_round(base + variation + hour_effect + profile.bias)
    }

    /// Concentration of each pollutant for a date, scaled by its AQI
    pub fn pollutant_concentrations(&self, date: NaiveDate, aqi: i64) -> Concentrations {
        let mut stream = SeededStream::from_key(&date_key(date));
        let seasonal = seasonal_factor(date);
        let aqi_scale = aqi as f64 / 50.0;

        // Draw order is part of the output contract
        let mut concentrations = Concentrations::new();
        concentrations.insert(
            Pollutant::Pm25,
            ((15.0 + 8.0 * seasonal) * aqi_scale + stream.normal(0.0, 3.0)).max(5.0),
        );
        concentrations.insert(
            Pollutant::Pm10,
            ((25.0 + 12.0 * seasonal) * aqi_scale + stream.normal(0.0, 5.0)).max(10.0),
        );
        concentrations.insert(
            Pollutant::Co,
            ((0.8 + 0.3 * seasonal) * aqi_scale + stream.normal(0.0, 0.2)).max(0.1),
        );
        concentrations.insert(
            Pollutant::No2,
            ((0.020 + 0.008 * seasonal) * aqi_scale + stream.normal(0.0, 0.005)).max(0.005),
        );
        concentrations.insert(
            Pollutant::So2,
            ((0.010 + 0.004 * seasonal) * aqi_scale + stream.normal(0.0, 0.003)).max(0.002),
        );
        concentrations.insert(
            Pollutant::O3,
            ((0.040 + 0.012 * seasonal.abs()) * aqi_scale + stream.normal(0.0, 0.008)).max(0.020),
        );
        concentrations
    }

    /// Peak concentration estimate for a day, clamped to the display range
    pub fn peak_concentration(&self, date: NaiveDate, profile: &PeakProfile, aqi: i64) -> f64 {
        let key = format!("peak|{}|{}", date_key(date), profile.pollutant.code());
        let mut stream = SeededStream::from_key(&key);

        let aqi_scale = aqi as f64 / 50.0;
        let raw = profile.base * aqi_scale + stream.normal(0.0, profile.std_dev * 0.3);
        let clamped = if profile.pollutant.unit() == "ppm" {
            raw.clamp(0.2, 3.0)
        } else {
            raw.clamp(5.0, 100.0)
        };
        round_to(clamped, 1)
    }

    /// Scan a month for the day with the highest AQI, per pollutant.
    ///
    /// `aqi_for` supplies each day's AQI; ties keep the earliest day.
    pub fn highest_concentration_days<F>(
        &self,
        year: i32,
        month: u32,
        mut aqi_for: F,
    ) -> Result<Vec<PollutantPeak>>
    where
        F: FnMut(NaiveDate) -> i64,
    {
        let num_days = days_in_month(year, month)
            .ok_or_else(|| CoreError::InvalidRequestDate(format!("{:04}-{:02}", year, month)))?;

        let daily: Vec<(NaiveDate, i64)> = (1..=num_days)
            .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
            .map(|date| (date, aqi_for(date)))
            .collect();

        let peaks = PEAK_PROFILES
            .iter()
            .map(|profile| {
                let mut highest_aqi = 0;
                let mut peak_day = 1;
                let mut peak_concentration = profile.base;

                for (date, aqi) in &daily {
                    if *aqi > highest_aqi {
                        highest_aqi = *aqi;
                        peak_day = date.day();
                        peak_concentration = self.peak_concentration(*date, profile, *aqi);
                    }
                }

                PollutantPeak {
                    pollutant: profile.pollutant,
                    day: peak_day,
                    concentration: round_to(peak_concentration, 1),
                    unit: profile.pollutant.unit(),
                    aqi: highest_aqi,
                }
            })
            .collect();

        Ok(peaks)
    }
}

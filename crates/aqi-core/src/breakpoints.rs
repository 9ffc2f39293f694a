//! AQI breakpoint tables and category classification
//!
//! Piecewise-linear mapping between pollutant concentration and AQI. Brackets
//! are ordered and non-overlapping; a concentration that falls in the gap
//! between two brackets (e.g. PM2.5 12.05) is clamped to the lower edge of the
//! next bracket.

use crate::models::Pollutant;
use serde::Serialize;
use std::fmt;

/// One bracket of a breakpoint table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub conc_low: f64,
    pub conc_high: f64,
    pub aqi_low: f64,
    pub aqi_high: f64,
}

const fn bp(conc_low: f64, conc_high: f64, aqi_low: f64, aqi_high: f64) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        aqi_low,
        aqi_high,
    }
}

/// µg/m³, 24-hour
const PM25: &[Breakpoint] = &[
    bp(0.0, 12.0, 0.0, 50.0),
    bp(12.1, 35.4, 51.0, 100.0),
    bp(35.5, 55.4, 101.0, 150.0),
    bp(55.5, 150.4, 151.0, 200.0),
    bp(150.5, 250.4, 201.0, 300.0),
    bp(250.5, 350.4, 301.0, 400.0),
    bp(350.5, 500.4, 401.0, 500.0),
];

/// µg/m³, 24-hour
const PM10: &[Breakpoint] = &[
    bp(0.0, 54.0, 0.0, 50.0),
    bp(55.0, 154.0, 51.0, 100.0),
    bp(155.0, 254.0, 101.0, 150.0),
    bp(255.0, 354.0, 151.0, 200.0),
    bp(355.0, 424.0, 201.0, 300.0),
    bp(425.0, 504.0, 301.0, 400.0),
    bp(505.0, 604.0, 401.0, 500.0),
];

/// ppm, 8-hour
const CO: &[Breakpoint] = &[
    bp(0.0, 4.4, 0.0, 50.0),
    bp(4.5, 9.4, 51.0, 100.0),
    bp(9.5, 12.4, 101.0, 150.0),
    bp(12.5, 15.4, 151.0, 200.0),
    bp(15.5, 30.4, 201.0, 300.0),
    bp(30.5, 40.4, 301.0, 400.0),
    bp(40.5, 50.4, 401.0, 500.0),
];

/// ppb, 1-hour
const SO2: &[Breakpoint] = &[
    bp(0.0, 35.0, 0.0, 50.0),
    bp(36.0, 75.0, 51.0, 100.0),
    bp(76.0, 185.0, 101.0, 150.0),
    bp(186.0, 304.0, 151.0, 200.0),
    bp(305.0, 604.0, 201.0, 300.0),
    bp(605.0, 804.0, 301.0, 400.0),
    bp(805.0, 1004.0, 401.0, 500.0),
];

/// ppb, 1-hour
const NO2: &[Breakpoint] = &[
    bp(0.0, 53.0, 0.0, 50.0),
    bp(54.0, 100.0, 51.0, 100.0),
    bp(101.0, 360.0, 101.0, 150.0),
    bp(361.0, 649.0, 151.0, 200.0),
    bp(650.0, 1249.0, 201.0, 300.0),
    bp(1250.0, 1649.0, 301.0, 400.0),
    bp(1650.0, 2049.0, 401.0, 500.0),
];

/// ppm, 8-hour
const O3: &[Breakpoint] = &[
    bp(0.000, 0.054, 0.0, 50.0),
    bp(0.055, 0.070, 51.0, 100.0),
    bp(0.071, 0.085, 101.0, 150.0),
    bp(0.086, 0.105, 151.0, 200.0),
    bp(0.106, 0.200, 201.0, 300.0),
];

/// Breakpoint table for a pollutant
pub fn table(pollutant: Pollutant) -> &'static [Breakpoint] {
    match pollutant {
        Pollutant::Pm25 => PM25,
        Pollutant::Pm10 => PM10,
        Pollutant::Co => CO,
        Pollutant::So2 => SO2,
        Pollutant::No2 => NO2,
        Pollutant::O3 => O3,
    }
}

/// Interpolate the AQI for a concentration.
///
/// Concentrations below the first bracket clamp to its lower bound, above the
/// last bracket to its upper bound.
pub fn aqi_from_concentration(pollutant: Pollutant, concentration: f64) -> f64 {
    let brackets = table(pollutant);
    let bracket = brackets
        .iter()
        .find(|b| concentration <= b.conc_high)
        .copied()
        .unwrap_or_else(|| {
            let last = brackets[brackets.len() - 1];
            bp(last.conc_high, last.conc_high, last.aqi_high, last.aqi_high)
        });

    let c = concentration.max(bracket.conc_low);
    interpolate(c, bracket.conc_low, bracket.conc_high, bracket.aqi_low, bracket.aqi_high)
}

/// Integer sub-index for a concentration
pub fn sub_index(pollutant: Pollutant, concentration: f64) -> i64 {
    aqi_from_concentration(pollutant, concentration).round_ties_even() as i64
}

/// Back-derive the concentration that produces `aqi`, same clamping rule
pub fn concentration_from_aqi(pollutant: Pollutant, aqi: f64) -> f64 {
    let brackets = table(pollutant);
    let bracket = brackets
        .iter()
        .find(|b| aqi <= b.aqi_high)
        .copied()
        .unwrap_or_else(|| {
            let last = brackets[brackets.len() - 1];
            bp(last.conc_high, last.conc_high, last.aqi_high, last.aqi_high)
        });

    let a = aqi.max(bracket.aqi_low);
    interpolate(a, bracket.aqi_low, bracket.aqi_high, bracket.conc_low, bracket.conc_high)
}

fn interpolate(x: f64, x_low: f64, x_high: f64, y_low: f64, y_high: f64) -> f64 {
    let span = x_high - x_low;
    if span.abs() < f64::EPSILON {
        return y_low;
    }
    y_low + (y_high - y_low) / span * (x - x_low)
}

/// Health category of an AQI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AqiCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: i64) -> Self {
        match aqi {
            i64::MIN..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pm25_bracket_edges() {
        assert!((aqi_from_concentration(Pollutant::Pm25, 12.0) - 50.0).abs() < 1e-9);
        assert!((aqi_from_concentration(Pollutant::Pm25, 35.4) - 100.0).abs() < 1e-9);
        assert_eq!(sub_index(Pollutant::Pm25, 55.4), 150);
    }

    #[test]
    fn test_interpolation_inside_bracket() {
        // Halfway through the first PM10 bracket
        let aqi = aqi_from_concentration(Pollutant::Pm10, 27.0);
        assert!((aqi - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_between_brackets_clamps_up() {
        let aqi = aqi_from_concentration(Pollutant::Pm25, 12.05);
        assert!((aqi - 51.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(aqi_from_concentration(Pollutant::Pm25, -4.0), 0.0);
        assert_eq!(aqi_from_concentration(Pollutant::Pm25, 900.0), 500.0);
        assert_eq!(aqi_from_concentration(Pollutant::O3, 0.5), 300.0);
    }

    #[test]
    fn test_back_derivation() {
        assert!((concentration_from_aqi(Pollutant::Pm25, 100.0) - 35.4).abs() < 1e-9);
        assert!((concentration_from_aqi(Pollutant::Pm25, 50.0) - 12.0).abs() < 1e-9);
        assert!((concentration_from_aqi(Pollutant::Co, 0.0)).abs() < 1e-9);

        let c = concentration_from_aqi(Pollutant::No2, 75.0);
        assert!((aqi_from_concentration(Pollutant::No2, c) - 75.0).abs() < 1e-6);
    }

    #[test]
    fn test_tables_are_monotonic() {
        for pollutant in Pollutant::ALL {
            let brackets = table(pollutant);
            for pair in brackets.windows(2) {
                assert!(pair[0].conc_high < pair[1].conc_low, "{:?}", pollutant);
                assert!(pair[0].aqi_high < pair[1].aqi_low, "{:?}", pollutant);
            }
        }
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(AqiCategory::from_aqi(50).label(), "Good");
        assert_eq!(AqiCategory::from_aqi(51).label(), "Moderate");
        assert_eq!(AqiCategory::from_aqi(100).label(), "Moderate");
        assert_eq!(
            AqiCategory::from_aqi(101).label(),
            "Unhealthy for Sensitive Groups"
        );
        assert_eq!(AqiCategory::from_aqi(151).label(), "Unhealthy");
        assert_eq!(AqiCategory::from_aqi(201).label(), "Very Unhealthy");
        assert_eq!(AqiCategory::from_aqi(301).label(), "Hazardous");
    }
}

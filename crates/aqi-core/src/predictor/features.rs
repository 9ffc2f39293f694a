//! Feature vector construction for inference
//!
//! Rebuilds, for an arbitrary target date, a row matching the schema the
//! models were trained on. Calendar fields are exact; the historical-context
//! features (lags, moving averages, trend, volatility) have no live feed and
//! are synthesized from a seasonal baseline plus noise drawn from a stream
//! keyed by the date, so the same date always yields the same row.

use crate::models::{FeatureRow, FeatureSchema};
use crate::simulation::{date_key, round_to, SeededStream};
use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;
use tracing::debug;

/// Builds feature rows in the order of a fixed schema
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    schema: FeatureSchema,
}

impl FeatureBuilder {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Build the row for `date`, projected onto the schema
    pub fn build(&self, date: NaiveDate) -> FeatureRow {
        let computed = Self::compute(date);
        let row = FeatureRow::project(&self.schema, &computed);
        debug!(
            date = %date,
            columns = row.len(),
            "Feature row built"
        );
        row
    }

    /// Every feature this builder knows how to produce, by name
    pub fn compute(date: NaiveDate) -> Vec<(&'static str, f64)> {
        let day_of_year = f64::from(date.ordinal());
        let weekday = date.weekday().num_days_from_monday();
        let seasonal = (2.0 * PI * day_of_year / 365.0).sin();

        let mut features = vec![
            ("year", f64::from(date.year())),
            ("month", f64::from(date.month())),
            ("day", f64::from(date.day())),
            ("weekday", f64::from(weekday)),
            ("day_of_year", day_of_year),
            ("is_weekend", if weekday >= 5 { 1.0 } else { 0.0 }),
            ("daily_avg_temp", round_to(25.0 + 10.0 * seasonal, 2)),
        ];

        let mut stream = SeededStream::from_key(&date_key(date));
        let base_aqi = 45.0 + 15.0 * seasonal;

        // Draw order is part of the output contract
        let lag_1 = base_aqi + stream.normal(0.0, 5.0);
        let lag_3 = base_aqi + stream.normal(0.0, 7.0);
        let lag_7 = base_aqi + stream.normal(0.0, 10.0);
        let ma_3 = base_aqi + stream.normal(0.0, 3.0);
        let ma_7 = base_aqi + stream.normal(0.0, 4.0);
        let trend_3 = stream.normal(0.0, 8.0);
        let volatility = stream.normal(8.0, 3.0).abs();

        features.extend([
            ("aqi_lag_1", round_to(lag_1, 2)),
            ("aqi_lag_3", round_to(lag_3, 2)),
            ("aqi_lag_7", round_to(lag_7, 2)),
            ("aqi_ma_3", round_to(ma_3, 2)),
            ("aqi_ma_7", round_to(ma_7, 2)),
            ("aqi_trend_3", round_to(trend_3, 2)),
            ("aqi_volatility", round_to(volatility, 2)),
        ]);

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CALENDAR_COLUMNS, DEFAULT_FEATURE_COLUMNS};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_schema_row() {
        let builder = FeatureBuilder::default();
        let row = builder.build(date(2025, 8, 9));

        assert_eq!(row.len(), 14);
        assert_eq!(row.columns(), &DEFAULT_FEATURE_COLUMNS);
        assert_eq!(row.get("year"), Some(2025.0));
        assert_eq!(row.get("month"), Some(8.0));
        assert_eq!(row.get("day"), Some(9.0));
        // 2025-08-09 is a Saturday
        assert_eq!(row.get("weekday"), Some(5.0));
        assert_eq!(row.get("is_weekend"), Some(1.0));
        assert_eq!(row.get("day_of_year"), Some(221.0));
    }

    #[test]
    fn test_weekday_flags() {
        let monday = FeatureBuilder::default().build(date(2025, 8, 11));
        assert_eq!(monday.get("weekday"), Some(0.0));
        assert_eq!(monday.get("is_weekend"), Some(0.0));
    }

    #[test]
    fn test_seasonal_temperature() {
        let row = FeatureBuilder::default().build(date(2025, 1, 1));
        let expected = round_to(25.0 + 10.0 * (2.0 * PI / 365.0).sin(), 2);
        assert_eq!(row.get("daily_avg_temp"), Some(expected));
    }

    #[test]
    fn test_same_date_same_row() {
        let builder = FeatureBuilder::default();
        assert_eq!(builder.build(date(2024, 2, 29)), builder.build(date(2024, 2, 29)));
        assert_ne!(
            builder.build(date(2024, 2, 29)).get("aqi_lag_1"),
            builder.build(date(2024, 3, 1)).get("aqi_lag_1")
        );
    }

    #[test]
    fn test_custom_schema_order_is_respected() {
        let schema = FeatureSchema::new(["aqi_ma_7", "month", "pressure_hpa", "year"]);
        let builder = FeatureBuilder::new(schema);
        let row = builder.build(date(2025, 3, 10));

        assert_eq!(row.columns(), &["aqi_ma_7", "month", "pressure_hpa", "year"]);
        assert_eq!(row.values()[1], 3.0);
        assert_eq!(row.values()[2], 0.0);
        assert_eq!(row.values()[3], 2025.0);

        let full = FeatureBuilder::default().build(date(2025, 3, 10));
        assert_eq!(row.get("aqi_ma_7"), full.get("aqi_ma_7"));
    }

    #[test]
    fn test_volatility_is_non_negative() {
        let builder = FeatureBuilder::default();
        let mut day = date(2025, 1, 1);
        for _ in 0..365 {
            assert!(builder.build(day).get("aqi_volatility").unwrap() >= 0.0);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_minimal_projection() {
        let row = FeatureBuilder::default().build(date(2025, 8, 9));
        let minimal = row.select(&CALENDAR_COLUMNS).unwrap();
        assert_eq!(minimal.columns(), &CALENDAR_COLUMNS);
        assert_eq!(minimal.values(), &[2025.0, 8.0, 9.0, 5.0, 221.0, 1.0]);
    }
}

//! Chart series generators
//!
//! Value sequences only; labels are the caller's concern.

use super::{days_in_month, round_to, SeededStream};
use crate::error::{CoreError, Result};
use crate::models::Pollutant;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of points in the daily AQI series
pub const DAILY_POINTS: usize = 365;

/// Months covered by the weekly AQI series
pub const WEEKLY_MONTHS: u32 = 12;

/// Sampled weeks per month in the weekly AQI series
pub const WEEKS_PER_MONTH: u32 = 4;

/// Sampling granularity of a pollutant series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Weekly,
    Daily,
}

impl Granularity {
    fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Weekly => "weekly",
            Granularity::Daily => "daily",
        }
    }

    /// Relative noise amplitude applied around the linear ramp
    fn noise(&self) -> f64 {
        match self {
            Granularity::Hourly => 0.15,
            Granularity::Weekly => 0.12,
            Granularity::Daily => 0.18,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Granularity::Hourly),
            "weekly" => Ok(Granularity::Weekly),
            "daily" => Ok(Granularity::Daily),
            other => Err(format!("unknown granularity '{}'", other)),
        }
    }
}

/// AQI for every day of the date's year, starting Jan 1.
///
/// The requested day is pinned to `pinned`; every other day comes from
/// `aqi_for`.
pub fn daily_aqi_series<F>(date: NaiveDate, pinned: i64, mut aqi_for: F) -> Vec<i64>
where
    F: FnMut(NaiveDate) -> i64,
{
    let Some(start) = NaiveDate::from_ymd_opt(date.year(), 1, 1) else {
        return Vec::new();
    };

    start
        .iter_days()
        .take(DAILY_POINTS)
        .map(|day| if day == date { pinned } else { aqi_for(day) })
        .collect()
}

/// AQI sampled four times a month over the twelve months ending with the
/// date's month.
///
/// Samples fall on days 1, 8, 15 and 22. The sample of the week containing
/// `date` is pinned to `pinned`; the others come from `aqi_for(day, offset)`
/// where `offset` is the week index times 24 hours.
pub fn weekly_aqi_series<F>(date: NaiveDate, pinned: i64, mut aqi_for: F) -> Vec<i64>
where
    F: FnMut(NaiveDate, u32) -> i64,
{
    let current_week = ((date.day() - 1) / 7).min(WEEKS_PER_MONTH - 1);
    let mut series = Vec::with_capacity((WEEKLY_MONTHS * WEEKS_PER_MONTH) as usize);

    for month_offset in 0..WEEKLY_MONTHS {
        let months_back = WEEKLY_MONTHS - 1 - month_offset;
        let mut month = date.month() as i32 - months_back as i32;
        let mut year = date.year();
        while month <= 0 {
            month += 12;
            year -= 1;
        }

        for week in 0..WEEKS_PER_MONTH {
            if months_back == 0 && week == current_week {
                series.push(pinned);
                continue;
            }
            let day = (1 + week * 7).min(28);
            let value = NaiveDate::from_ymd_opt(year, month as u32, day)
                .map(|sample| aqi_for(sample, week * 24))
                .unwrap_or(pinned);
            series.push(value);
        }
    }

    series
}

/// Deterministic display series for one pollutant and month
pub fn pollutant_series(
    pollutant: Pollutant,
    year: i32,
    month: u32,
    granularity: Granularity,
) -> Result<Vec<f64>> {
    let days = days_in_month(year, month)
        .ok_or_else(|| CoreError::InvalidRequestDate(format!("{:04}-{:02}", year, month)))?;

    let points = match granularity {
        Granularity::Hourly => 8,
        Granularity::Weekly => 4,
        Granularity::Daily => days as usize,
    };

    let key = format!("{}-{:04}-{:02}-{}", pollutant.code(), year, month, granularity);
    let mut stream = SeededStream::from_key(&key);
    let (low, high) = pollutant.display_range();
    let amplitude = granularity.noise();

    let series = linspace(low, high, points)
        .into_iter()
        .map(|base| round_to(base * (1.0 + stream.uniform(-amplitude, amplitude)), 1))
        .collect();

    Ok(series)
}

fn linspace(low: f64, high: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![low],
        n => {
            let step = (high - low) / (n - 1) as f64;
            (0..n).map(|i| low + step * i as f64).collect()
        }
    }
}

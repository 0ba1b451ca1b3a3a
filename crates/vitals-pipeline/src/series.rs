//! Record model: the canonical daily time-series shape and its derived
//! metrics (trailing rolling average, cumulative total).
//!
//! Both computations are pure functions over an ordered slice; the naive
//! O(n * window) re-averaging is fine at these volumes (series run hundreds
//! to low thousands of records).

use serde::{Deserialize, Serialize};

/// Trailing window size for the rolling average, in samples.
pub const ROLLING_WINDOW: usize = 7;

/// One time-bucketed raw observation. `date` is epoch seconds at local
/// midnight in the reference timezone; ordered ascending within a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: i64,
    pub deaths: i64,
}

/// A raw record augmented with derived fields. This is the published shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDaily {
    pub date: i64,
    pub deaths: i64,
    pub rolling_average: f64,
    pub cumulative_deaths: i64,
}

/// Trailing rolling average per index.
///
/// For `i < window` the value is exactly `0.0`, an explicit placeholder
/// signalling insufficient history, not a null. For `i >= window` it is the
/// arithmetic mean of `deaths` over `[i - window, i)`, excluding index `i`.
pub fn rolling_averages(records: &[DailyRecord], window: usize) -> Vec<f64> {
    records
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i < window {
                0.0
            } else {
                let sum: i64 = records[i - window..i].iter().map(|r| r.deaths).sum();
                sum as f64 / window as f64
            }
        })
        .collect()
}

/// Running left-to-right sum: `c[0] = deaths[0]`, `c[i] = c[i-1] + deaths[i]`.
pub fn cumulative(records: &[DailyRecord]) -> Vec<i64> {
    let mut total = 0_i64;
    records
        .iter()
        .map(|r| {
            total += r.deaths;
            total
        })
        .collect()
}

/// Combine a raw series with both derived fields.
pub fn derive(records: &[DailyRecord]) -> Vec<DerivedDaily> {
    let averages = rolling_averages(records, ROLLING_WINDOW);
    let totals = cumulative(records);

    records
        .iter()
        .zip(averages)
        .zip(totals)
        .map(|((r, rolling_average), cumulative_deaths)| DerivedDaily {
            date: r.date,
            deaths: r.deaths,
            rolling_average,
            cumulative_deaths,
        })
        .collect()
}

/// The series' maximum timestamp, fed to change detection. Records are
/// ordered ascending, so this is the last record's date.
pub fn latest_date(records: &[DailyRecord]) -> Option<i64> {
    records.last().map(|r| r.date)
}

// ============================================================================
// Tests
// ============================================================================

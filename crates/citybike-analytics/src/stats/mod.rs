//! Descriptive statistics over numeric slices.
//!
//! Quantiles use linear interpolation between closest ranks
//! (`pos = (n - 1) * q`). Standard deviations are population
//! deviations (divisor `n`).

pub mod distance;
pub mod outliers;

use crate::error::{AnalyticsError, Result};
use crate::types::DurationStats;
use crate::utils::round2;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Quantile of already sorted values. `sorted` must be non-empty.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Linear-interpolation quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&q) {
        return Err(AnalyticsError::InvalidInput(format!(
            "quantile {} is outside [0, 1]",
            q
        )));
    }
    if values.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "cannot take a quantile of no values".to_string(),
        ));
    }
    Ok(quantile_sorted(&sorted(values), q))
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "cannot average no values".to_string(),
        ));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn population_std(values: &[f64]) -> Result<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Ok(variance.sqrt())
}

/// Summary of trip durations, each value rounded to 2 decimals.
pub fn duration_stats(durations: &[f64]) -> Result<DurationStats> {
    if durations.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "no trip durations to summarize".to_string(),
        ));
    }
    let sorted = sorted(durations);

    Ok(DurationStats {
        mean: round2(mean(&sorted)?),
        median: round2(quantile_sorted(&sorted, 0.5)),
        std: round2(population_std(&sorted)?),
        p25: round2(quantile_sorted(&sorted, 0.25)),
        p75: round2(quantile_sorted(&sorted, 0.75)),
        p90: round2(quantile_sorted(&sorted, 0.90)),
    })
}

/// Fare of every trip: `unlock_fee + per_minute * duration + per_km * distance`.
pub fn calculate_fares(
    durations: &[f64],
    distances: &[f64],
    per_minute: f64,
    per_km: f64,
    unlock_fee: f64,
) -> Result<Vec<f64>> {
    if durations.len() != distances.len() {
        return Err(AnalyticsError::LengthMismatch {
            left: "durations".to_string(),
            left_len: durations.len(),
            right: "distances".to_string(),
            right_len: distances.len(),
        });
    }

    Ok(durations
        .iter()
        .zip(distances)
        .map(|(duration, distance)| unlock_fee + per_minute * duration + per_km * distance)
        .collect())
}

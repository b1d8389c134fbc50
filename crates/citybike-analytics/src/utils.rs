//! Shared utilities for the analytics pipeline.
//!
//! Column extraction helpers, the rounding policy, and the stable
//! count-ranking used by every "top N" metric.

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{AnalyticsError, Result};

// =============================================================================
// Rounding
// =============================================================================

/// Decimal places used for every reported rate, mean and cost.
pub const REPORT_DECIMALS: i32 = 2;

/// Round to `decimals` places, ties to even.
///
/// Matches numpy/pandas `round`, so exact binary ties such as `2.125`
/// go to `2.12`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Round to the reporting precision.
#[inline]
pub fn round2(value: f64) -> f64 {
    round_to(value, REPORT_DECIMALS)
}

// =============================================================================
// Ranking
// =============================================================================

/// Count occurrences and order them by descending count.
///
/// Keys with equal counts keep the order in which they were first seen.
pub fn rank_by_count<K, I>(items: I) -> Vec<(K, usize)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();

    for item in items {
        match positions.get(&item) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                positions.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }

    // sort_by is stable
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Keep the first `n` entries of a ranking.
pub fn top_n<K>(mut ranked: Vec<(K, usize)>, n: usize) -> Vec<(K, usize)> {
    ranked.truncate(n);
    ranked
}

// =============================================================================
// Column access
// =============================================================================

/// Get a column as a series, mapping absence to [`AnalyticsError::ColumnNotFound`].
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| AnalyticsError::ColumnNotFound(name.to_string()))
}

/// Check if a table has a column with this name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Textual values of a column. Non-string columns are cast first.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = require_column(df, name)?;
    let casted = series.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

/// Numeric values of a column as `f64`.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = require_column(df, name)?;
    let casted = series.cast(&DataType::Float64)?;
    let values = casted.f64()?.into_iter().collect();
    Ok(values)
}

/// Non-null numeric values of a column.
pub fn non_null_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    Ok(f64_values(df, name)?.into_iter().flatten().collect())
}

/// Millisecond timestamps of a datetime column.
pub fn timestamp_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = require_column(df, name)?;
    if !matches!(series.dtype(), DataType::Datetime(_, _)) {
        return Err(AnalyticsError::InvalidInput(format!(
            "column '{}' is {:?}, expected a datetime",
            name,
            series.dtype()
        )));
    }
    let millis = series.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    let physical = millis.cast(&DataType::Int64)?;
    let values = physical.i64()?.into_iter().collect();
    Ok(values)
}

/// Convert epoch milliseconds to a naive UTC datetime.
pub fn millis_to_datetime(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round2() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.675_000_1), 2.68);
        assert_eq!(round2(-1.005_1), -1.01);
        assert_eq!(round2(70.0), 70.0);
    }

    #[test]
    fn test_round2_ties_to_even() {
        assert_eq!(round2(2.125), 2.12);
        assert_eq!(round2(2.375), 2.38);
        assert_eq!(round2(-0.625), -0.62);
        assert_eq!(round_to(0.5, 0), 0.0);
        assert_eq!(round_to(1.5, 0), 2.0);
    }

    #[test]
    fn test_rank_by_count_descending() {
        let ranked = rank_by_count(vec!["a", "b", "b", "c", "b", "c"]);
        assert_eq!(ranked, vec![("b", 3), ("c", 2), ("a", 1)]);
    }

    #[test]
    fn test_rank_by_count_ties_keep_first_seen_order() {
        let ranked = rank_by_count(vec!["z", "y", "x", "y", "z", "x"]);
        assert_eq!(ranked, vec![("z", 2), ("y", 2), ("x", 2)]);
    }

    #[test]
    fn test_top_n_truncates() {
        let ranked = rank_by_count(1..=20u32);
        assert_eq!(top_n(ranked, 3).len(), 3);
        assert!(top_n(rank_by_count(Vec::<u32>::new()), 3).is_empty());
    }

    #[test]
    fn test_require_column_missing() {
        let df = df!["a" => [1, 2]].unwrap();
        let err = require_column(&df, "b").unwrap_err();
        assert!(matches!(err, AnalyticsError::ColumnNotFound(name) if name == "b"));
        assert!(has_column(&df, "a"));
        assert!(!has_column(&df, "b"));
    }

    #[test]
    fn test_string_values_casts_numbers() {
        let df = df!["a" => [1i64, 2]].unwrap();
        assert_eq!(
            string_values(&df, "a").unwrap(),
            vec![Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[test]
    fn test_f64_values_keeps_nulls() {
        let df = df!["a" => [Some(1.5), None, Some(3.0)]].unwrap();
        assert_eq!(f64_values(&df, "a").unwrap(), vec![Some(1.5), None, Some(3.0)]);
        assert_eq!(non_null_f64(&df, "a").unwrap(), vec![1.5, 3.0]);
    }

    #[test]
    fn test_timestamp_values_rejects_text() {
        let df = df!["start_time" => ["2024-01-01"]].unwrap();
        assert!(timestamp_values(&df, "start_time").is_err());
    }

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_704_103_200_000).unwrap();
        assert_eq!(dt.to_string(), "2024-01-01 10:00:00");
    }
}

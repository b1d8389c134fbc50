//! Row-filtering transforms applied to loaded tables.
//!
//! This module provides:
//! - dropping rows with a null in any column
//! - dropping exact duplicate rows (first occurrence kept, order preserved)
//! - keeping rows whose field equals a given value
//!
//! Every transform takes the table by reference and returns a new one.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::error::{AnalyticsError, Result};
use crate::utils::{require_column, string_values};

/// A single cleaning transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CleaningStep {
    /// Remove rows with a null in any column
    DropIncompleteRows,
    /// Remove rows that repeat an earlier row across all columns
    DropDuplicateRows,
    /// Keep rows where `field` renders as `value`
    FilterByEquality { field: String, value: String },
}

impl fmt::Display for CleaningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleaningStep::DropIncompleteRows => write!(f, "drop incomplete rows"),
            CleaningStep::DropDuplicateRows => write!(f, "drop duplicate rows"),
            CleaningStep::FilterByEquality { field, value } => {
                write!(f, "keep rows where {} == '{}'", field, value)
            }
        }
    }
}

/// Remove every row that has a null in any column.
pub fn drop_incomplete_rows(df: &DataFrame) -> Result<DataFrame> {
    Ok(df.drop_nulls::<String>(None)?)
}

/// Remove rows that exactly repeat an earlier row, keeping input order.
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<DataFrame> {
    if df.height() == 0 || df.width() == 0 {
        return Ok(df.clone());
    }

    let as_text: Vec<Series> = df
        .get_columns()
        .iter()
        .map(|col| col.as_materialized_series().cast(&DataType::String))
        .collect::<PolarsResult<_>>()?;
    let chunked: Vec<&StringChunked> = as_text
        .iter()
        .map(|s| s.str())
        .collect::<PolarsResult<_>>()?;

    let mut seen: HashSet<Vec<Option<&str>>> = HashSet::with_capacity(df.height());
    let mask_values: Vec<bool> = (0..df.height())
        .map(|idx| {
            let key: Vec<Option<&str>> = chunked.iter().map(|ca| ca.get(idx)).collect();
            seen.insert(key)
        })
        .collect();

    let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
    Ok(df.filter(&mask)?)
}

/// Keep rows whose `field` equals `value`, compared as text.
pub fn filter_by_equality(df: &DataFrame, field: &str, value: &str) -> Result<DataFrame> {
    require_column(df, field)?;

    let mask_values: Vec<bool> = string_values(df, field)?
        .iter()
        .map(|cell| cell.as_deref() == Some(value))
        .collect();

    let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
    Ok(df.filter(&mask)?)
}

/// Fail when a station id appears on more than one row.
pub fn ensure_unique_station_ids(df: &DataFrame) -> Result<()> {
    let mut seen = HashSet::with_capacity(df.height());
    for value in string_values(df, "station_id")?.into_iter().flatten() {
        if !seen.insert(value.clone()) {
            return Err(AnalyticsError::DuplicateStationId(value));
        }
    }
    Ok(())
}

/// A cleaned table and a description of what each step removed.
#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    pub df: DataFrame,
    pub actions: Vec<String>,
}

/// Applies an ordered list of [`CleaningStep`]s.
pub struct DataCleaner;

impl DataCleaner {
    /// Apply a single step.
    pub fn apply_step(df: &DataFrame, step: &CleaningStep) -> Result<DataFrame> {
        match step {
            CleaningStep::DropIncompleteRows => drop_incomplete_rows(df),
            CleaningStep::DropDuplicateRows => drop_duplicate_rows(df),
            CleaningStep::FilterByEquality { field, value } => {
                filter_by_equality(df, field, value)
            }
        }
    }

    /// Apply `steps` in order to a copy of `df`.
    pub fn clean(df: &DataFrame, steps: &[CleaningStep], table: &str) -> Result<CleaningOutcome> {
        info!("Cleaning {} ({} rows, {} steps)...", table, df.height(), steps.len());

        let mut current = df.clone();
        let mut actions = Vec::with_capacity(steps.len());

        for step in steps {
            let before = current.height();
            current = Self::apply_step(&current, step)?;
            let removed = before - current.height();

            if removed > 0 {
                let pct = (removed as f64 / before as f64) * 100.0;
                actions.push(format!(
                    "{}: {} removed {} rows ({:.1}%)",
                    table, step, removed, pct
                ));
            } else {
                actions.push(format!("{}: {} removed no rows", table, step));
            }
            debug!("{}: {} -> {} rows", table, step, current.height());
        }

        Ok(CleaningOutcome {
            df: current,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn trips() -> DataFrame {
        df![
            "trip_id" => ["T1", "T2", "T2", "T3", "T4"],
            "distance_km" => [Some(1.0), Some(2.0), Some(2.0), None, Some(4.0)],
            "status" => ["completed", "cancelled", "cancelled", "completed", "completed"],
        ]
        .unwrap()
    }

    fn ids(df: &DataFrame) -> Vec<String> {
        string_values(df, "trip_id")
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_drop_incomplete_rows() {
        let original = trips();
        let cleaned = drop_incomplete_rows(&original).unwrap();

        assert_eq!(cleaned.height(), 4);
        for col in cleaned.get_columns() {
            assert_eq!(col.null_count(), 0);
        }
        // subset of the input, input untouched
        assert!(ids(&cleaned).iter().all(|id| ids(&original).contains(id)));
        assert_eq!(original.height(), 5);
    }

    #[test]
    fn test_drop_duplicate_rows_keeps_first_in_order() {
        let cleaned = drop_duplicate_rows(&trips()).unwrap();
        assert_eq!(ids(&cleaned), vec!["T1", "T2", "T3", "T4"]);
    }

    #[test]
    fn test_drop_duplicate_rows_idempotent() {
        let once = drop_duplicate_rows(&trips()).unwrap();
        let twice = drop_duplicate_rows(&once).unwrap();
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_drop_duplicate_rows_treats_nulls_as_equal() {
        let df = df![
            "a" => [Some(1), None, None],
            "b" => ["x", "y", "y"],
        ]
        .unwrap();
        assert_eq!(drop_duplicate_rows(&df).unwrap().height(), 2);
    }

    #[test]
    fn test_drop_duplicate_rows_requires_all_columns_equal() {
        let df = df![
            "a" => [1, 1],
            "b" => ["x", "y"],
        ]
        .unwrap();
        assert_eq!(drop_duplicate_rows(&df).unwrap().height(), 2);
    }

    #[test]
    fn test_filter_by_equality() {
        let cleaned = filter_by_equality(&trips(), "status", "completed").unwrap();
        assert_eq!(ids(&cleaned), vec!["T1", "T3", "T4"]);
    }

    #[test]
    fn test_filter_by_equality_unknown_field() {
        let err = filter_by_equality(&trips(), "state", "completed").unwrap_err();
        assert!(matches!(err, AnalyticsError::ColumnNotFound(ref f) if f == "state"));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_clean_applies_steps_in_order() {
        let steps = vec![
            CleaningStep::DropIncompleteRows,
            CleaningStep::DropDuplicateRows,
            CleaningStep::FilterByEquality {
                field: "status".to_string(),
                value: "completed".to_string(),
            },
        ];
        let outcome = DataCleaner::clean(&trips(), &steps, "trips").unwrap();

        assert_eq!(ids(&outcome.df), vec!["T1", "T4"]);
        assert_eq!(outcome.actions.len(), 3);
        assert!(outcome.actions[0].contains("removed 1 rows"));
    }

    #[test]
    fn test_ensure_unique_station_ids() {
        let ok = df!["station_id" => ["S1", "S2"]].unwrap();
        assert!(ensure_unique_station_ids(&ok).is_ok());

        let dup = df!["station_id" => ["S1", "S2", "S1"]].unwrap();
        let err = ensure_unique_station_ids(&dup).unwrap_err();
        assert!(matches!(err, AnalyticsError::DuplicateStationId(ref id) if id == "S1"));
    }

    #[test]
    fn test_step_serialization() {
        let step = CleaningStep::FilterByEquality {
            field: "status".into(),
            value: "completed".into(),
        };
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(
            json,
            r#"{"step":"filter_by_equality","field":"status","value":"completed"}"#
        );
        let back: CleaningStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
    }
}

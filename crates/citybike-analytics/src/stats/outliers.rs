//! Outlier detection.
//!
//! Two independent detectors, each producing a boolean mask aligned with
//! its input: IQR fencing (used on trip duration) and z-score
//! thresholding (usable on any numeric column).

use polars::prelude::*;
use tracing::debug;

use super::quantile_sorted;
use crate::error::{AnalyticsError, Result};
use crate::utils::{f64_values, round_to};

/// Decimal places the IQR is rounded to before the fences are computed.
pub const IQR_ROUNDING_DECIMALS: i32 = 2;

/// Default fence multiplier.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Quartiles and fences of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrFences {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrFences {
    /// Compute fences `Q1 - k*IQR` and `Q3 + k*IQR`.
    pub fn compute(values: &[f64], multiplier: f64) -> Result<Self> {
        if values.is_empty() {
            return Err(AnalyticsError::EmptyInput(
                "cannot compute IQR fences of no values".to_string(),
            ));
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let q1 = quantile_sorted(&sorted, 0.25);
        let q3 = quantile_sorted(&sorted, 0.75);
        let iqr = round_to(q3 - q1, IQR_ROUNDING_DECIMALS);

        Ok(Self {
            q1,
            q3,
            iqr,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    /// Strictly below the lower fence or strictly above the upper one.
    pub fn is_outside(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Mask of values strictly outside the IQR fences.
pub fn iqr_outlier_mask(values: &[f64], multiplier: f64) -> Result<Vec<bool>> {
    let fences = IqrFences::compute(values, multiplier)?;
    Ok(values.iter().map(|v| fences.is_outside(*v)).collect())
}

/// Rows of `df` whose `column` lies outside the IQR fences.
///
/// Fences are computed over the non-null values; null cells are never
/// flagged.
pub fn iqr_outlier_rows(df: &DataFrame, column: &str, multiplier: f64) -> Result<DataFrame> {
    let values = f64_values(df, column)?;
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return Ok(df.clear());
    }

    let fences = IqrFences::compute(&present, multiplier)?;
    debug!(
        "{}: Q1={} Q3={} IQR={} fences=[{}, {}]",
        column, fences.q1, fences.q3, fences.iqr, fences.lower, fences.upper
    );

    let mask_values: Vec<bool> = values
        .iter()
        .map(|v| matches!(v, Some(x) if fences.is_outside(*x)))
        .collect();
    let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
    Ok(df.filter(&mask)?)
}

/// Mask of values more than `threshold` population standard deviations
/// from the mean. A sample without variance has no outliers.
pub fn zscore_outlier_mask(values: &[f64], threshold: f64) -> Vec<bool> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    if std == 0.0 {
        return vec![false; values.len()];
    }
    values
        .iter()
        .map(|v| ((v - mean) / std).abs() > threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_iqr_fences() {
        let values = [5.0, 6.0, 6.0, 7.0, 8.0, 9.0, 10.0, 50.0];
        let fences = IqrFences::compute(&values, DEFAULT_IQR_MULTIPLIER).unwrap();

        assert!((fences.q1 - 6.0).abs() < EPS);
        assert!((fences.q3 - 9.25).abs() < EPS);
        assert!((fences.iqr - 3.25).abs() < EPS);
        assert!((fences.lower - 1.125).abs() < EPS);
        assert!((fences.upper - 14.125).abs() < EPS);

        let mask = iqr_outlier_mask(&values, DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(
            mask,
            vec![false, false, false, false, false, false, false, true]
        );
    }

    #[test]
    fn test_iqr_rounding_tie_goes_to_even() {
        // Q1 = 1, Q3 = 3.125, IQR 2.125 rounds to 2.12, upper fence 6.305
        let values = [0.0, 0.0, 1.0, 2.0, 2.0, 3.0, 3.125, 6.31, 6.31];
        let fences = IqrFences::compute(&values, DEFAULT_IQR_MULTIPLIER).unwrap();

        assert!((fences.q1 - 1.0).abs() < EPS);
        assert!((fences.q3 - 3.125).abs() < EPS);
        assert_eq!(fences.iqr, 2.12);
        assert!((fences.upper - 6.305).abs() < EPS);

        let mask = iqr_outlier_mask(&values, DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(
            mask,
            vec![false, false, false, false, false, false, false, true, true]
        );
    }

    #[test]
    fn test_iqr_value_on_fence_is_kept() {
        // Q1 = 2, Q3 = 3, IQR = 1, upper fence = 4.5
        let values = [1.0, 2.0, 2.0, 3.0, 3.0, 5.5];
        let fences = IqrFences::compute(&values, DEFAULT_IQR_MULTIPLIER).unwrap();
        assert!(!fences.is_outside(fences.upper));
        assert!(fences.is_outside(fences.upper + 0.01));
    }

    #[test]
    fn test_iqr_outlier_rows() {
        let df = df![
            "trip_id" => ["T1", "T2", "T3", "T4", "T5", "T6", "T7", "T8", "T9"],
            "duration_minutes" => [Some(5.0), Some(6.0), Some(6.0), Some(7.0), Some(8.0), Some(9.0), Some(10.0), Some(50.0), None],
        ]
        .unwrap();

        let outliers = iqr_outlier_rows(&df, "duration_minutes", DEFAULT_IQR_MULTIPLIER).unwrap();
        assert_eq!(outliers.height(), 1);
        let id = outliers
            .column("trip_id")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0);
        assert_eq!(id, Some("T8"));
    }

    #[test]
    fn test_iqr_outlier_rows_missing_column() {
        let df = df!["trip_id" => ["T1"]].unwrap();
        let err = iqr_outlier_rows(&df, "duration_minutes", 1.5).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_zscore_flags_single_extreme() {
        // with n values and one extreme, |z| tops out at sqrt(n - 1)
        let mut values = vec![1.0; 15];
        values.push(100.0);
        let mask = zscore_outlier_mask(&values, 3.0);
        assert_eq!(mask.iter().filter(|m| **m).count(), 1);
        assert!(mask[15]);
    }

    #[test]
    fn test_zscore_eight_values() {
        let values = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 100.0];
        // z of the 100 is sqrt(7) ~ 2.65
        assert!(zscore_outlier_mask(&values, 3.0).iter().all(|m| !m));
        let mask = zscore_outlier_mask(&values, 2.5);
        assert_eq!(mask.iter().filter(|m| **m).count(), 1);
        assert!(mask[7]);
    }

    #[test]
    fn test_zscore_zero_variance() {
        assert_eq!(zscore_outlier_mask(&[5.0; 4], 0.0), vec![false; 4]);
        assert!(zscore_outlier_mask(&[], 3.0).is_empty());
    }
}

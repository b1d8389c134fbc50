//! Pairwise station distances in coordinate-degree space.

use polars::prelude::*;
use tracing::info;

use crate::error::{AnalyticsError, Result};
use crate::types::{StationDistanceSummary, StationPair};
use crate::utils::{f64_values, string_values};

/// Symmetric `n x n` Euclidean distance matrix with a zero diagonal.
pub fn station_distance_matrix(latitudes: &[f64], longitudes: &[f64]) -> Result<Vec<Vec<f64>>> {
    if latitudes.len() != longitudes.len() {
        return Err(AnalyticsError::LengthMismatch {
            left: "latitudes".to_string(),
            left_len: latitudes.len(),
            right: "longitudes".to_string(),
            right_len: longitudes.len(),
        });
    }

    let matrix = latitudes
        .iter()
        .zip(longitudes)
        .map(|(lat_a, lon_a)| {
            latitudes
                .iter()
                .zip(longitudes)
                .map(|(lat_b, lon_b)| ((lat_a - lat_b).powi(2) + (lon_a - lon_b).powi(2)).sqrt())
                .collect()
        })
        .collect();
    Ok(matrix)
}

/// Position and value of an off-diagonal matrix entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixCell {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Minimum and maximum off-diagonal entries.
///
/// Ties resolve to the first occurrence in row-major order.
pub fn off_diagonal_extremes(matrix: &[Vec<f64>]) -> Result<(MatrixCell, MatrixCell)> {
    if matrix.len() < 2 {
        return Err(AnalyticsError::InvalidInput(format!(
            "need at least two stations for a distance pair, got {}",
            matrix.len()
        )));
    }

    let mut min: Option<MatrixCell> = None;
    let mut max: Option<MatrixCell> = None;

    for (row, values) in matrix.iter().enumerate() {
        for (col, &value) in values.iter().enumerate() {
            if row == col {
                continue;
            }
            let cell = MatrixCell { row, col, value };
            if min.is_none_or(|m| value < m.value) {
                min = Some(cell);
            }
            if max.is_none_or(|m| value > m.value) {
                max = Some(cell);
            }
        }
    }

    match (min, max) {
        (Some(min), Some(max)) => Ok((min, max)),
        _ => Err(AnalyticsError::InvalidInput(
            "distance matrix has no off-diagonal entries".to_string(),
        )),
    }
}

/// Closest and farthest station pairs of a cleaned stations table.
pub fn station_distance_summary(stations: &DataFrame) -> Result<StationDistanceSummary> {
    let ids: Vec<String> = string_values(stations, "station_id")?
        .into_iter()
        .map(|id| id.unwrap_or_default())
        .collect();
    let latitudes = non_null(stations, "latitude")?;
    let longitudes = non_null(stations, "longitude")?;

    let matrix = station_distance_matrix(&latitudes, &longitudes)?;
    let (closest, farthest) = off_diagonal_extremes(&matrix)?;

    let pair = |cell: MatrixCell| StationPair {
        from_station_id: ids[cell.row].clone(),
        to_station_id: ids[cell.col].clone(),
        distance: cell.value,
    };
    let summary = StationDistanceSummary {
        station_count: ids.len(),
        closest: pair(closest),
        farthest: pair(farthest),
    };

    info!(
        "Station distances: closest {} <-> {} ({:.4}), farthest {} <-> {} ({:.4})",
        summary.closest.from_station_id,
        summary.closest.to_station_id,
        summary.closest.distance,
        summary.farthest.from_station_id,
        summary.farthest.to_station_id,
        summary.farthest.distance
    );
    Ok(summary)
}

fn non_null(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    f64_values(df, column)?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                AnalyticsError::InvalidInput(format!("null coordinate in '{}'", column))
            })
        })
        .collect()
}

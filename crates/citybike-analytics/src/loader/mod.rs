//! Record loading for the three raw datasets.
//!
//! Files are read with every column as text, then each column named in the
//! dataset's [`TableSchema`] is converted to its typed representation.
//! Cells that fail to parse become nulls and are counted in the
//! [`LoadReport`]; the drop-incomplete cleaning step removes those rows later.
//! Columns not named in the schema are kept as trimmed text.

mod converters;

pub use converters::{is_missing_marker, parse_float, parse_integer, parse_timestamp};

use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{AnalyticsError, Result, ResultExt};
use crate::utils::has_column;
use converters::{normalize_text, text_to_float, text_to_integer, text_to_timestamp};

/// Typed representation of a column after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Timestamp,
}

/// One column of a dataset schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Loading fails when a required column is absent from the header.
    pub required: bool,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        required: false,
    }
}

/// Column layout of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns holding timestamps.
    pub fn timestamp_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Timestamp)
            .map(|c| c.name)
    }
}

pub const TRIPS_SCHEMA: TableSchema = TableSchema {
    columns: &[
        col("trip_id", ColumnKind::Text),
        col("user_id", ColumnKind::Text),
        col("bike_id", ColumnKind::Text),
        col("start_station_id", ColumnKind::Text),
        col("end_station_id", ColumnKind::Text),
        col("start_time", ColumnKind::Timestamp),
        col("end_time", ColumnKind::Timestamp),
        col("distance_km", ColumnKind::Float),
        col("duration_minutes", ColumnKind::Float),
        col("user_type", ColumnKind::Text),
        col("status", ColumnKind::Text),
    ],
};

pub const STATIONS_SCHEMA: TableSchema = TableSchema {
    columns: &[
        col("station_id", ColumnKind::Text),
        col("name", ColumnKind::Text),
        col("capacity", ColumnKind::Integer),
        col("latitude", ColumnKind::Float),
        col("longitude", ColumnKind::Float),
    ],
};

pub const MAINTENANCE_SCHEMA: TableSchema = TableSchema {
    columns: &[
        col("record_id", ColumnKind::Text),
        col("bike_id", ColumnKind::Text),
        col("date", ColumnKind::Timestamp),
        col("maintenance_type", ColumnKind::Text),
        col("cost", ColumnKind::Float),
        col("description", ColumnKind::Text),
        optional("bike_type", ColumnKind::Text),
    ],
};

/// The raw datasets the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dataset {
    Maintenance,
    Stations,
    Trips,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Maintenance => "maintenance",
            Dataset::Stations => "stations",
            Dataset::Trips => "trips",
        }
    }

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Dataset::Maintenance => &MAINTENANCE_SCHEMA,
            Dataset::Stations => &STATIONS_SCHEMA,
            Dataset::Trips => &TRIPS_SCHEMA,
        }
    }
}

/// What happened while loading one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub dataset: String,
    pub rows: usize,
    pub columns: usize,
    /// Cells per column that held text but failed to parse.
    pub coerced_cells: BTreeMap<String, usize>,
}

impl LoadReport {
    pub fn total_coerced(&self) -> usize {
        self.coerced_cells.values().sum()
    }
}

/// Read a CSV file with every column as text.
pub fn read_text_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Failed to open {}", path.display()))?
        .finish()
        .context(format!("Failed to read {}", path.display()))
}

/// Convert the text columns of a freshly read table to the dataset's schema.
pub fn apply_schema(df: DataFrame, dataset: Dataset) -> Result<(DataFrame, LoadReport)> {
    let mut df = df;
    let schema = dataset.schema();
    let mut report = LoadReport {
        dataset: dataset.name().to_string(),
        rows: df.height(),
        columns: df.width(),
        coerced_cells: BTreeMap::new(),
    };

    if let Some(missing) = schema
        .columns
        .iter()
        .find(|spec| spec.required && !has_column(&df, spec.name))
    {
        return Err(AnalyticsError::ColumnNotFound(missing.name.to_string())
            .with_context(format!("Loading {}", dataset.name())));
    }

    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for col_name in &column_names {
        let series = df.column(col_name)?.as_materialized_series();
        if series.dtype() != &DataType::String {
            continue;
        }

        let kind = schema
            .column(col_name)
            .map(|spec| spec.kind)
            .unwrap_or(ColumnKind::Text);

        let (converted, coerced) = match kind {
            ColumnKind::Text => (normalize_text(series)?, 0),
            ColumnKind::Integer => text_to_integer(series)?,
            ColumnKind::Float => text_to_float(series)?,
            ColumnKind::Timestamp => text_to_timestamp(series)?,
        };

        if coerced > 0 {
            warn!(
                "{}: {} unparseable value(s) in '{}' coerced to null",
                dataset.name(),
                coerced,
                col_name
            );
            report.coerced_cells.insert(col_name.clone(), coerced);
        }

        df.replace(col_name, converted)?;
    }

    debug!(
        "{} schema applied: {} rows, {} coerced cells",
        dataset.name(),
        report.rows,
        report.total_coerced()
    );

    Ok((df, report))
}

/// Load one dataset from disk.
pub fn load_table(path: impl AsRef<Path>, dataset: Dataset) -> Result<(DataFrame, LoadReport)> {
    let path = path.as_ref();
    info!("Loading {} from: {}", dataset.name(), path.display());
    let raw = read_text_csv(path)?;
    let (df, report) = apply_schema(raw, dataset)?;
    info!("{} loaded: {:?}", dataset.name(), df.shape());
    Ok((df, report))
}

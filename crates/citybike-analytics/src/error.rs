//! Custom error types for the analytics pipeline.
//!
//! Errors fall into three families:
//!
//! - input errors: a request the data cannot satisfy (unknown column,
//!   mismatched array lengths, absent group, empty table)
//! - missing metrics: the report builder was asked for a key that no
//!   analyzer produced
//! - infrastructure errors wrapping I/O, polars and JSON failures
//!
//! Cell-level parse failures never surface here; the loader coerces them to
//! nulls and counts them in its [`LoadReport`](crate::loader::LoadReport).
//!
//! Errors are serializable so a run summary can embed them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::config::ConfigValidationError;

/// The main error type for the analytics pipeline.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Column was not found in the table.
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),

    /// Invalid request or parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Two parallel arrays disagree in length.
    #[error("Length mismatch: {left} has {left_len} values but {right} has {right_len}")]
    LengthMismatch {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },

    /// A group expected by an accessor is absent from a grouped aggregate.
    #[error("Group '{group}' not present in '{column}'")]
    MissingGroup { column: String, group: String },

    /// Computation needs at least one row but the input was empty.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// The same station identifier appears on more than one cleaned row.
    #[error("Station id '{0}' appears more than once after cleaning")]
    DuplicateStationId(String),

    /// Report builder asked to render a key absent from the results.
    #[error("Metric '{0}' missing from aggregate results")]
    MissingMetric(String),

    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigValidationError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AnalyticsError>,
    },
}

impl AnalyticsError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AnalyticsError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable code for the error kind, used in serialized run summaries.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Self::MissingGroup { .. } => "MISSING_GROUP",
            Self::EmptyInput(_) => "EMPTY_INPUT",
            Self::DuplicateStationId(_) => "DUPLICATE_STATION_ID",
            Self::MissingMetric(_) => "MISSING_METRIC",
            Self::Config(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error belongs to the input-error family.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::InvalidInput(_)
            | Self::LengthMismatch { .. }
            | Self::MissingGroup { .. }
            | Self::EmptyInput(_)
            | Self::DuplicateStationId(_) => true,
            Self::WithContext { source, .. } => source.is_input_error(),
            _ => false,
        }
    }

    /// Check if this error is a missing report metric.
    pub fn is_missing_metric(&self) -> bool {
        match self {
            Self::MissingMetric(_) => true,
            Self::WithContext { source, .. } => source.is_missing_metric(),
            _ => false,
        }
    }
}

impl Serialize for AnalyticsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("AnalyticsError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AnalyticsError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| AnalyticsError::Io(e).with_context(context))
    }
}

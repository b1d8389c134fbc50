//! CityBike Analytics Library
//!
//! Descriptive analytics over bike-share operational records, built on Polars.
//!
//! # Overview
//!
//! The library turns three raw CSV exports (trips, stations, maintenance)
//! into a sectioned analytics report:
//!
//! - **Loading**: per-dataset schemas; malformed timestamps and numbers become nulls
//! - **Cleaning**: ordered drop-incomplete / drop-duplicate / equality-filter steps
//! - **Caching**: cleaned stations and trips persisted next to the raw inputs
//! - **Trip metrics**: totals, rankings, peak hours, utilization, completion rates,
//!   duration outliers and statistics, weekday and monthly volume, revenue
//! - **Maintenance metrics**: cost by bike type, frequency by maintenance type
//! - **Station distances**: closest and farthest station pairs
//! - **Reporting**: text report, CSV exports and a JSON companion
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use citybike_analytics::{AnalyticsConfig, Pipeline};
//!
//! let config = AnalyticsConfig::builder()
//!     .data_dir("data")
//!     .output_dir("output")
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run()?;
//!
//! println!("{}", result.report);
//! ```
//!
//! # Numeric conventions
//!
//! Reported rates, means and costs are rounded to 2 decimals. Quantiles use
//! linear interpolation between ranks. Standard deviations are population
//! deviations. The IQR is rounded to 2 decimals before the fences are drawn.

pub mod analysis;
pub mod cache;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod reporting;
pub mod stats;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use analysis::{MaintenanceAnalyzer, TripAnalyzer};
pub use cache::{CleanDataCache, CleanTables};
pub use cleaner::{CleaningStep, DataCleaner};
pub use config::{
    AnalyticsConfig, AnalyticsConfigBuilder, CleaningConfig, ConfigValidationError, DatasetPaths,
    FareSchedule, MaintenancePolicy, OutlierConfig, RankingConfig,
};
pub use error::{AnalyticsError, Result as AnalyticsResult, ResultExt};
pub use loader::{Dataset, LoadReport, load_table};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, ProgressReporter,
    ProgressUpdate,
};
pub use reporting::{AnalysisReport, ReportGenerator};
pub use stats::distance::{station_distance_matrix, station_distance_summary};
pub use stats::outliers::{IQR_ROUNDING_DECIMALS, iqr_outlier_mask, zscore_outlier_mask};
pub use stats::{calculate_fares, duration_stats, quantile};
pub use types::{
    AggregateResults, MaintenanceAnalysis, MetricValue, PipelineResult, StationDistanceSummary,
    TripAnalysis, TripStatus, UserType,
};

static_assertions::assert_impl_all!(PipelineResult: Send);
static_assertions::assert_impl_all!(AggregateResults: Send, Sync);

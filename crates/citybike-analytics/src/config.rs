//! Configuration types for the analytics pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup. Configurations are also
//! serde-serializable so a run can be driven from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cleaner::CleaningStep;
use crate::types::TripStatus;

/// Locations of the raw inputs and the clean-data cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPaths {
    pub maintenance: PathBuf,
    pub stations: PathBuf,
    pub trips: PathBuf,
    /// Cached cleaned stations table.
    pub stations_clean: PathBuf,
    /// Cached cleaned trips table.
    pub trips_clean: PathBuf,
}

impl DatasetPaths {
    /// Standard file layout under a data directory.
    pub fn from_data_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            maintenance: dir.join("maintenance.csv"),
            stations: dir.join("stations.csv"),
            trips: dir.join("trips.csv"),
            stations_clean: dir.join("stations_clean.csv"),
            trips_clean: dir.join("trips_clean.csv"),
        }
    }
}

impl Default for DatasetPaths {
    fn default() -> Self {
        Self::from_data_dir("data")
    }
}

/// How the maintenance table is prepared before analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MaintenancePolicy {
    /// Use the raw table unmodified
    #[default]
    AsIs,
    /// Drop incomplete rows, then exact duplicates
    Clean,
}

/// Per-table cleaning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Steps applied to the stations table, in order.
    pub station_steps: Vec<CleaningStep>,

    /// Steps applied to the trips table, in order.
    pub trip_steps: Vec<CleaningStep>,

    /// Preparation of the maintenance table.
    /// Default: AsIs
    pub maintenance_policy: MaintenancePolicy,

    /// Fail when a station id appears on more than one cleaned row.
    /// Default: true
    pub enforce_unique_station_ids: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            station_steps: vec![CleaningStep::DropIncompleteRows, CleaningStep::DropDuplicateRows],
            trip_steps: vec![
                CleaningStep::DropIncompleteRows,
                CleaningStep::DropDuplicateRows,
                CleaningStep::FilterByEquality {
                    field: "status".to_string(),
                    value: TripStatus::Completed.as_str().to_string(),
                },
            ],
            maintenance_policy: MaintenancePolicy::default(),
            enforce_unique_station_ids: true,
        }
    }
}

/// Outlier detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Fence multiplier applied to the IQR.
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Z-score cutoff for the generic detector.
    /// Default: 3.0
    pub zscore_threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            zscore_threshold: 3.0,
        }
    }
}

/// Sizes of the ranked lists in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub top_stations: usize,
    pub peak_hours: usize,
    pub active_users: usize,
    pub routes: usize,
    pub serviced_bikes: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_stations: 10,
            peak_hours: 10,
            active_users: 15,
            routes: 10,
            serviced_bikes: 10,
        }
    }
}

/// Pricing used for the estimated-revenue metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareSchedule {
    pub per_minute: f64,
    pub per_km: f64,
    pub unlock_fee: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            per_minute: 0.15,
            per_km: 0.10,
            unlock_fee: 1.0,
        }
    }
}

/// Configuration for the analytics pipeline.
///
/// Use [`AnalyticsConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use citybike_analytics::config::AnalyticsConfig;
///
/// let config = AnalyticsConfig::builder()
///     .data_dir("data")
///     .output_dir("output")
///     .zscore_threshold(2.5)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Raw input and cache locations.
    pub paths: DatasetPaths,

    /// Directory for the text report and CSV/JSON exports.
    /// Default: "output"
    pub output_dir: PathBuf,

    pub cleaning: CleaningConfig,

    pub outliers: OutlierConfig,

    pub rankings: RankingConfig,

    pub fares: FareSchedule,

    /// Ignore existing cache files and rebuild them from the raw inputs.
    /// Default: false
    pub rebuild_cache: bool,

    /// Whether to write the report and exports to disk.
    /// Default: true
    pub save_to_disk: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            paths: DatasetPaths::default(),
            output_dir: PathBuf::from("output"),
            cleaning: CleaningConfig::default(),
            outliers: OutlierConfig::default(),
            rankings: RankingConfig::default(),
            fares: FareSchedule::default(),
            rebuild_cache: false,
            save_to_disk: true,
        }
    }
}

impl AnalyticsConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalyticsConfigBuilder {
        AnalyticsConfigBuilder::default()
    }

    /// Read a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalyticsConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.outliers.iqr_multiplier.is_nan() || self.outliers.iqr_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "iqr_multiplier".to_string(),
                value: self.outliers.iqr_multiplier,
            });
        }

        if self.outliers.zscore_threshold.is_nan() || self.outliers.zscore_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "zscore_threshold".to_string(),
                value: self.outliers.zscore_threshold,
            });
        }

        let rankings = [
            ("top_stations", self.rankings.top_stations),
            ("peak_hours", self.rankings.peak_hours),
            ("active_users", self.rankings.active_users),
            ("routes", self.rankings.routes),
            ("serviced_bikes", self.rankings.serviced_bikes),
        ];
        if let Some((field, _)) = rankings.iter().find(|(_, size)| *size == 0) {
            return Err(ConfigValidationError::InvalidRankingSize(field.to_string()));
        }

        let fares = [
            ("per_minute", self.fares.per_minute),
            ("per_km", self.fares.per_km),
            ("unlock_fee", self.fares.unlock_fee),
        ];
        if let Some((field, value)) = fares.iter().find(|(_, v)| v.is_nan() || *v < 0.0) {
            return Err(ConfigValidationError::NegativeFare {
                field: field.to_string(),
                value: *value,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be greater than 0.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid ranking size for '{0}' (must be at least 1)")]
    InvalidRankingSize(String),

    #[error("Invalid fare component '{field}': {value} (must not be negative)")]
    NegativeFare { field: String, value: f64 },
}

/// Builder for [`AnalyticsConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalyticsConfigBuilder {
    paths: Option<DatasetPaths>,
    output_dir: Option<PathBuf>,
    cleaning: Option<CleaningConfig>,
    maintenance_policy: Option<MaintenancePolicy>,
    enforce_unique_station_ids: Option<bool>,
    iqr_multiplier: Option<f64>,
    zscore_threshold: Option<f64>,
    rankings: Option<RankingConfig>,
    fares: Option<FareSchedule>,
    rebuild_cache: Option<bool>,
    save_to_disk: Option<bool>,
}

impl AnalyticsConfigBuilder {
    /// Use the standard file layout under `dir` for inputs and cache.
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.paths = Some(DatasetPaths::from_data_dir(dir));
        self
    }

    /// Set explicit input and cache paths.
    pub fn paths(mut self, paths: DatasetPaths) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Set the output directory for the report and exports.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Replace the per-table cleaning configuration.
    pub fn cleaning(mut self, cleaning: CleaningConfig) -> Self {
        self.cleaning = Some(cleaning);
        self
    }

    /// Set how the maintenance table is prepared.
    pub fn maintenance_policy(mut self, policy: MaintenancePolicy) -> Self {
        self.maintenance_policy = Some(policy);
        self
    }

    /// Enable or disable the station id uniqueness check.
    pub fn enforce_unique_station_ids(mut self, enforce: bool) -> Self {
        self.enforce_unique_station_ids = Some(enforce);
        self
    }

    /// Set the IQR fence multiplier.
    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = Some(multiplier);
        self
    }

    /// Set the z-score cutoff.
    pub fn zscore_threshold(mut self, threshold: f64) -> Self {
        self.zscore_threshold = Some(threshold);
        self
    }

    /// Set the ranked list sizes.
    pub fn rankings(mut self, rankings: RankingConfig) -> Self {
        self.rankings = Some(rankings);
        self
    }

    /// Set the fare schedule used for estimated revenue.
    pub fn fares(mut self, fares: FareSchedule) -> Self {
        self.fares = Some(fares);
        self
    }

    /// Force a cache rebuild even when cached files exist.
    pub fn rebuild_cache(mut self, rebuild: bool) -> Self {
        self.rebuild_cache = Some(rebuild);
        self
    }

    /// Enable or disable writing the report and exports.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalyticsConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalyticsConfig, ConfigValidationError> {
        let mut cleaning = self.cleaning.unwrap_or_default();
        if let Some(policy) = self.maintenance_policy {
            cleaning.maintenance_policy = policy;
        }
        if let Some(enforce) = self.enforce_unique_station_ids {
            cleaning.enforce_unique_station_ids = enforce;
        }

        let defaults = OutlierConfig::default();
        let config = AnalyticsConfig {
            paths: self.paths.unwrap_or_default(),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("output")),
            cleaning,
            outliers: OutlierConfig {
                iqr_multiplier: self.iqr_multiplier.unwrap_or(defaults.iqr_multiplier),
                zscore_threshold: self.zscore_threshold.unwrap_or(defaults.zscore_threshold),
            },
            rankings: self.rankings.unwrap_or_default(),
            fares: self.fares.unwrap_or_default(),
            rebuild_cache: self.rebuild_cache.unwrap_or(false),
            save_to_disk: self.save_to_disk.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

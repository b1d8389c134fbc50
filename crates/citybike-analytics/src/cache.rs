//! Clean-data cache.
//!
//! Cleaned stations and trips tables are persisted as CSV next to the raw
//! inputs. When both files exist they are loaded directly (timestamps are
//! re-parsed on load); otherwise the raw inputs are loaded, cleaned, and
//! the cache is written. The cache is never invalidated automatically;
//! set `rebuild_cache` to force a rebuild.

use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

use crate::cleaner::{CleaningStep, DataCleaner, ensure_unique_station_ids};
use crate::config::{CleaningConfig, DatasetPaths, MaintenancePolicy};
use crate::error::{Result, ResultExt};
use crate::loader::{Dataset, LoadReport, load_table};

/// Layout timestamps are written with in cache files. Keeps the
/// millisecond precision the loader parses.
pub const CACHE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The three tables the analyzers read.
#[derive(Debug, Clone)]
pub struct CleanTables {
    pub maintenance: DataFrame,
    pub stations: DataFrame,
    pub trips: DataFrame,
}

/// Result of [`CleanDataCache::load_or_build`].
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub tables: CleanTables,
    /// Trips as loaded from the raw file, before any cleaning step.
    pub raw_trips: DataFrame,
    /// Stations and trips were read from existing cache files.
    pub cache_hit: bool,
    pub cleaning_actions: Vec<String>,
    pub load_reports: Vec<LoadReport>,
}

/// Loads cleaned tables from disk, building them first when needed.
pub struct CleanDataCache<'a> {
    paths: &'a DatasetPaths,
    cleaning: &'a CleaningConfig,
}

impl<'a> CleanDataCache<'a> {
    pub fn new(paths: &'a DatasetPaths, cleaning: &'a CleaningConfig) -> Self {
        Self { paths, cleaning }
    }

    /// Both cache files exist.
    pub fn is_populated(&self) -> bool {
        self.paths.stations_clean.is_file() && self.paths.trips_clean.is_file()
    }

    pub fn load_or_build(&self, rebuild: bool) -> Result<CacheOutcome> {
        let mut outcome = if self.is_populated() && !rebuild {
            info!(
                "Using cached tables: {}, {}",
                self.paths.stations_clean.display(),
                self.paths.trips_clean.display()
            );
            self.load_cached()?
        } else {
            if rebuild {
                info!("Rebuilding clean-data cache");
            }
            self.build()?
        };

        if self.cleaning.enforce_unique_station_ids {
            ensure_unique_station_ids(&outcome.tables.stations)
                .context("Checking cleaned stations")?;
        }

        let (maintenance, report, actions) = self.prepare_maintenance()?;
        outcome.tables.maintenance = maintenance;
        outcome.load_reports.push(report);
        outcome.cleaning_actions.extend(actions);

        Ok(outcome)
    }

    fn load_cached(&self) -> Result<CacheOutcome> {
        let (stations, stations_report) = load_table(&self.paths.stations_clean, Dataset::Stations)?;
        let (trips, trips_report) = load_table(&self.paths.trips_clean, Dataset::Trips)?;
        let (raw_trips, raw_trips_report) = load_table(&self.paths.trips, Dataset::Trips)?;

        Ok(CacheOutcome {
            tables: CleanTables {
                maintenance: DataFrame::empty(),
                stations,
                trips,
            },
            raw_trips,
            cache_hit: true,
            cleaning_actions: Vec::new(),
            load_reports: vec![stations_report, trips_report, raw_trips_report],
        })
    }

    fn build(&self) -> Result<CacheOutcome> {
        let (raw_stations, stations_report) = load_table(&self.paths.stations, Dataset::Stations)?;
        let (raw_trips, trips_report) = load_table(&self.paths.trips, Dataset::Trips)?;

        let stations = DataCleaner::clean(&raw_stations, &self.cleaning.station_steps, "stations")?;
        let trips = DataCleaner::clean(&raw_trips, &self.cleaning.trip_steps, "trips")?;

        let mut stations_df = stations.df;
        let mut trips_df = trips.df;
        write_table(&mut stations_df, &self.paths.stations_clean)?;
        write_table(&mut trips_df, &self.paths.trips_clean)?;

        let mut cleaning_actions = stations.actions;
        cleaning_actions.extend(trips.actions);

        Ok(CacheOutcome {
            tables: CleanTables {
                maintenance: DataFrame::empty(),
                stations: stations_df,
                trips: trips_df,
            },
            raw_trips,
            cache_hit: false,
            cleaning_actions,
            load_reports: vec![stations_report, trips_report],
        })
    }

    fn prepare_maintenance(&self) -> Result<(DataFrame, LoadReport, Vec<String>)> {
        let (raw, report) = load_table(&self.paths.maintenance, Dataset::Maintenance)?;
        match self.cleaning.maintenance_policy {
            MaintenancePolicy::AsIs => {
                debug!("Maintenance table used as loaded ({} rows)", raw.height());
                Ok((raw, report, Vec::new()))
            }
            MaintenancePolicy::Clean => {
                let steps = [CleaningStep::DropIncompleteRows, CleaningStep::DropDuplicateRows];
                let cleaned = DataCleaner::clean(&raw, &steps, "maintenance")?;
                Ok((cleaned.df, report, cleaned.actions))
            }
        }
    }
}

/// Write a table as CSV, creating the parent directory.
pub fn write_table(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_datetime_format(Some(CACHE_DATETIME_FORMAT.to_string()))
        .finish(df)
        .context(format!("Failed to write {}", path.display()))?;

    info!("Saved {} rows to {}", df.height(), path.display());
    Ok(())
}

//! Main analytics pipeline.
//!
//! This module provides the `Pipeline` struct and its builder.

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::analysis::{MaintenanceAnalyzer, TripAnalyzer};
use crate::cache::CleanDataCache;
use crate::config::{AnalyticsConfig, ConfigValidationError};
use crate::error::Result;
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::reporting::ReportGenerator;
use crate::stats::distance::station_distance_summary;
use crate::types::{AggregateResults, PipelineResult};

/// The analytics pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use citybike_analytics::{AnalyticsConfig, Pipeline};
///
/// let result = Pipeline::builder()
///     .config(AnalyticsConfig::builder().data_dir("data").build()?)
///     .on_progress(|update| println!("{}", update.message))
///     .build()?
///     .run()?;
///
/// println!("{}", result.report);
/// ```
pub struct Pipeline {
    config: AnalyticsConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    reporter: ReportGenerator,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Run every stage in order.
    ///
    /// A failing stage aborts the run; no report file is written unless
    /// every metric was computed.
    pub fn run(&self) -> Result<PipelineResult> {
        match self.run_internal() {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn enter(&self, stage: PipelineStage) {
        info!("{}...", stage.display_name());
        self.report_progress(ProgressUpdate::new(stage, stage.display_name()));
    }

    fn run_internal(&self) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let config = &self.config;

        info!("Starting analytics pipeline...");
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            "Starting analytics pipeline...",
        ));

        // 1. Cleaned tables
        self.enter(PipelineStage::LoadingData);
        let cache = CleanDataCache::new(&config.paths, &config.cleaning);
        let loaded = cache.load_or_build(config.rebuild_cache)?;
        let tables = loaded.tables;
        let raw_trips = loaded.raw_trips;

        // 2. Trips
        self.enter(PipelineStage::TripAnalysis);
        let trips = TripAnalyzer::new(config).analyze(&tables.trips, &raw_trips)?;

        // 3. Maintenance
        self.enter(PipelineStage::MaintenanceAnalysis);
        let maintenance =
            MaintenanceAnalyzer::new(config.rankings.serviced_bikes).analyze(&tables.maintenance)?;

        // 4. Station distances
        self.enter(PipelineStage::StationDistances);
        let distances = station_distance_summary(&tables.stations)?;

        let results = AggregateResults::new()
            .merge(trips)
            .merge(maintenance)
            .merge(distances);

        // 5. Reports
        self.enter(PipelineStage::ReportGeneration);
        let report = self.reporter.render_text(&results)?;
        let written_files = if config.save_to_disk {
            self.reporter
                .write_all(&report, &results, loaded.cache_hit, &loaded.cleaning_actions)?
        } else {
            Vec::new()
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Pipeline finished in {} ms ({} metrics, cache hit: {})",
            duration_ms,
            results.len(),
            loaded.cache_hit
        );

        Ok(PipelineResult {
            cache_hit: loaded.cache_hit,
            cleaning_actions: loaded.cleaning_actions,
            results,
            report,
            written_files,
            duration_ms,
        })
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<AnalyticsConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: AnalyticsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving stage updates.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reporter = ReportGenerator::new(config.output_dir.clone());

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
            reporter,
        })
    }
}

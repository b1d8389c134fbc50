//! CLI entry point for the CityBike analytics pipeline.

use anyhow::{Context, Result, anyhow};
use citybike_analytics::{AnalyticsConfig, DatasetPaths, Pipeline, PipelineResult};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bike-share analytics report generator",
    long_about = "Cleans trip, station and maintenance exports and writes an analytics report.\n\n\
                  EXAMPLES:\n  \
                  # Default layout: data/*.csv in, output/ out\n  \
                  citybike-analytics\n\n  \
                  # Rebuild the cleaned-data cache\n  \
                  citybike-analytics --rebuild-cache\n\n  \
                  # Custom configuration, metrics as JSON on stdout\n  \
                  citybike-analytics --config analytics.json --json"
)]
struct Args {
    /// Directory holding trips.csv, stations.csv and maintenance.csv
    ///
    /// Overrides the paths of a --config file.
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Output directory for the report and exports
    #[arg(short, long)]
    output: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Ignore cached cleaned tables and rebuild them
    #[arg(long)]
    rebuild_cache: bool,

    /// Compute the report without writing any output files
    #[arg(long)]
    no_save: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Print the metrics as JSON to stdout instead of the text report
    ///
    /// Disables all logging so stdout only holds JSON.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only holds JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<AnalyticsConfig> {
    let mut config = match &args.config {
        Some(path) => AnalyticsConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AnalyticsConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        if !Path::new(dir).is_dir() {
            return Err(anyhow!("Data directory not found: {}", dir));
        }
        config.paths = DatasetPaths::from_data_dir(dir);
    }
    if let Some(output) = &args.output {
        config.output_dir = output.into();
    }
    config.rebuild_cache |= args.rebuild_cache;
    if args.no_save {
        config.save_to_disk = false;
    }

    config.validate()?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

fn print_summary(result: &PipelineResult) {
    println!("{}", result.report);
    if !result.written_files.is_empty() {
        println!("Files written:");
        for path in &result.written_files {
            println!("  {}", path.display());
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();

    let config = build_config(&args)?;
    info!(
        "Reading inputs from {}",
        config
            .paths
            .trips
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    );

    let pipeline = Pipeline::builder().config(config).build()?;
    let result = pipeline.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.results)?);
    } else {
        print_summary(&result);
        info!(
            "Done in {} ms (cache {})",
            result.duration_ms,
            if result.cache_hit { "hit" } else { "rebuilt" }
        );
    }

    Ok(())
}

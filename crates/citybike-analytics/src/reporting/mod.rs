//! Report generation module.
//!
//! Renders the merged [`AggregateResults`](crate::types::AggregateResults)
//! into a sectioned text report and writes the auxiliary exports:
//!
//! - `summary_report.txt`: the text report
//! - `top_stations.csv`: top start and end stations side by side
//! - `top_users.csv`: most active users
//! - `analysis_report.json`: every metric plus run metadata
//!
//! Rendering happens before anything is written, so a missing metric
//! leaves the output directory untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use citybike_analytics::reporting::ReportGenerator;
//!
//! let generator = ReportGenerator::new("output");
//! let text = generator.render_text(&results)?;
//! println!("{}", text);
//! ```

mod generator;

pub use generator::{
    AnalysisReport, JSON_REPORT_FILE, ReportGenerator, TEXT_REPORT_FILE, TOP_STATIONS_FILE,
    TOP_USERS_FILE,
};

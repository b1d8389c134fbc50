//! Analyzers over the cleaned tables.
//!
//! Each analyzer returns an immutable result struct; the pipeline merges
//! them into [`crate::types::AggregateResults`].

pub mod maintenance;
pub mod trips;

pub use maintenance::MaintenanceAnalyzer;
pub use trips::TripAnalyzer;

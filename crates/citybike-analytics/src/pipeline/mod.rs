//! Pipeline module.
//!
//! Wires the loader, cleaner, analyzers and report builder together.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};

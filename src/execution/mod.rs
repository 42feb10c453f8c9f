//! Execution engine module.
//!
//! This module drives a stitching run from tile source to plane sink.

pub mod engine;
pub mod progress;

pub use engine::{StitchEngine, StitchOptions, StitchSummary};
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};

//! Core types for the tilestitch pipeline.
//!
//! This module contains the foundational types shared by every pass:
//! - Sample types and single-channel plane buffers
//! - Padding, assembly mode and tile regions
//! - Error types

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{Direction, StitchError, StitchResult};
pub use types::{
    AssemblyMode, Padding, Plane, PlaneData, Sample, SampleType, TileInfo, TileRegion,
};

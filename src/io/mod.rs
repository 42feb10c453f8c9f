//! Tile input and plane output adapters.
//!
//! - [`source`]: the [`TileSource`] trait with TIFF and in-memory readers
//! - [`sink`]: the [`PlaneSink`] trait with BigTIFF and in-memory writers
//! - [`metadata`]: rewriting of the textual metadata block

pub mod metadata;
pub mod sink;
pub mod source;

pub use metadata::{adjust_dimensions, output_description, to_ascii};
pub use sink::{BigTiffSink, MemoryPlaneSink, PlaneSink};
pub use source::{MemoryTileSource, TiffTileSource, TileSource};

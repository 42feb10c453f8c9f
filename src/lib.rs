//! # tilestitch - Microscopy Tile Stitching
//!
//! tilestitch assembles one large image plane from a grid of overlapping
//! tiles and harmonizes object labels that were assigned independently per
//! tile.
//!
//! ## Features
//!
//! - **Geometric assembly**: overlap and outer padding are trimmed so tiles abut exactly
//! - **Label offsets**: labels of each tile are shifted past those of the tiles before it
//! - **Border remapping**: objects cut by a tile border are joined through the shared overlap strip
//! - **Parallel execution**: border comparisons and tile reads run on rayon
//! - **Multi-page tiles**: every page (channel, z-slice, timepoint) becomes one output plane
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tilestitch::prelude::*;
//!
//! // Discover tiles named like `R1_X001_Y001.tif`
//! let tiles = TileSet::from_directory("tiles/", None)?;
//! let source = TiffTileSource::from_tile_set(&tiles);
//!
//! // Stitch into a multi-page BigTIFF
//! let options = StitchOptions::new().with_overlap(32).with_mode(AssemblyMode::Labels);
//! let mut sink = BigTiffSink::create("stitched.tif")?;
//! let summary = StitchEngine::new(options).run(&source, tiles.x_nblocks(), tiles.y_nblocks(), &mut sink)?;
//! println!("{} page(s) of {:?}", summary.pages, summary.output_size);
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Sample types, planes, regions and errors
//! - [`grid`]: Tile name parsing and grid geometry
//! - [`io`]: Tile sources, plane sinks and metadata rewriting
//! - [`stitch`]: Plane assembly, border remapping and relabeling
//! - [`execution`]: The engine that drives a run, with progress reporting

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod execution;
pub mod grid;
pub mod io;
pub mod stitch;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use tilestitch::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{
        AssemblyMode, Padding, Plane, PlaneData, Sample, SampleType, TileInfo, TileRegion,
    };

    // Errors
    pub use crate::core::error::{Direction, StitchError, StitchResult};

    // Grid
    pub use crate::grid::layout::{GridLayout, TileSlot};
    pub use crate::grid::naming::{TileName, TileSet};

    // I/O
    pub use crate::io::sink::{BigTiffSink, MemoryPlaneSink, PlaneSink};
    pub use crate::io::source::{MemoryTileSource, TiffTileSource, TileSource};

    // Stitching passes
    pub use crate::stitch::assemble::{AssembledPlane, PlaneAssembler, TileOffsets};
    pub use crate::stitch::relabel::relabel;
    pub use crate::stitch::remap::{LabelMap, RemapResolver, RemapTable, TileRemap};

    // Execution
    pub use crate::execution::engine::{StitchEngine, StitchOptions, StitchSummary};
    pub use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "tilestitch");
    }

    #[test]
    fn test_prelude_stitches_a_row() {
        let tiles: Vec<PlaneData> = (1..=2u16)
            .map(|n| {
                let plane: Plane<u16> = image::ImageBuffer::from_pixel(4, 4, image::Luma([n]));
                plane.into()
            })
            .collect();
        let source = MemoryTileSource::single_page(tiles);
        let mut sink = MemoryPlaneSink::new();

        let summary = StitchEngine::new(StitchOptions::new().with_overlap(1))
            .run(&source, 2, 1, &mut sink)
            .unwrap();
        assert_eq!(summary.output_size, (4, 2));
        // Uniform tiles touch in the overlap, so tile 1's label joins tile 0's.
        assert!(summary.relabeled_pixels > 0);
        match &sink.planes[0].0 {
            PlaneData::U32(plane) => assert_eq!(plane.get_pixel(3, 1).0[0], 1),
            other => panic!("expected u32 plane, got {:?}", other.sample_type()),
        }
    }
}

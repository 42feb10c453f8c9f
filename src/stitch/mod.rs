//! Stitching passes.
//!
//! - [`assemble`]: trims tiles and places them in one plane, offsetting labels
//! - [`remap`]: label correspondences across shared tile borders
//! - [`relabel`]: applies the correspondences to an assembled label plane

pub mod assemble;
pub mod relabel;
pub mod remap;

pub use assemble::{AssembledPlane, PlaneAssembler, TileOffsets};
pub use relabel::relabel;
pub use remap::{border_remapping, BorderTask, LabelMap, RemapResolver, RemapTable, TileRemap};

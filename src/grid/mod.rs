//! Tile grid discovery and geometry.
//!
//! This module provides:
//! - Tile name parsing and row-major ordering
//! - Per-tile trim and placement regions

pub mod layout;
pub mod naming;

pub use layout::{GridLayout, TileSlot};
pub use naming::{TileName, TileSet};

//! Error types for tilestitch.
//!
//! Uses thiserror for structured errors with context. Every variant is fatal
//! for the run: there is no retry and no partial output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Orientation of a border shared by two adjacent tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Left tile against the tile to its right.
    Horizontal,
    /// Upper tile against the tile below it.
    Vertical,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Horizontal => write!(f, "horizontal"),
            Direction::Vertical => write!(f, "vertical"),
        }
    }
}

/// Top-level error type for tilestitch.
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("Invalid grid: {reason}")]
    InvalidGrid { reason: String },

    #[error("Overlap of {overlap}px leaves nothing of a {width}x{height} tile after trimming")]
    OverlapOutOfRange {
        overlap: u32,
        width: u32,
        height: u32,
    },

    #[error("Failed to read tile {tile}: {error}")]
    TileRead { tile: String, error: String },

    #[error("Border remap between tiles {first} and {second} ({direction}) failed: {error}")]
    RemapTaskFailure {
        first: usize,
        second: usize,
        direction: Direction,
        error: Box<StitchError>,
    },

    #[error("Label offset overflows u32 at tile {tile}")]
    LabelOverflow { tile: usize },

    #[error("Cannot place tile '{name}': {reason}")]
    TileName { name: String, reason: String },

    #[error("Failed to write output {}: {error}", path.display())]
    Output { path: PathBuf, error: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StitchError {
    /// Shorthand for an [`StitchError::InvalidGrid`] with a formatted reason.
    pub fn invalid_grid(reason: impl Into<String>) -> Self {
        StitchError::InvalidGrid {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`StitchError::TileRead`] on a tile described by `tile`.
    pub fn tile_read(tile: impl fmt::Display, error: impl fmt::Display) -> Self {
        StitchError::TileRead {
            tile: tile.to_string(),
            error: error.to_string(),
        }
    }

    /// Whether the error was raised before any pixel was processed.
    pub fn is_geometry_error(&self) -> bool {
        matches!(
            self,
            StitchError::InvalidGrid { .. }
                | StitchError::OverlapOutOfRange { .. }
                | StitchError::TileName { .. }
        )
    }
}

/// Result type alias for tilestitch operations.
pub type StitchResult<T> = Result<T, StitchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_failure_wraps_cause() {
        let error = StitchError::RemapTaskFailure {
            first: 0,
            second: 1,
            direction: Direction::Horizontal,
            error: Box::new(StitchError::tile_read("r1_c2.tif", "truncated strip")),
        };
        let message = error.to_string();
        assert!(message.contains("tiles 0 and 1"));
        assert!(message.contains("horizontal"));
        assert!(message.contains("truncated strip"));
    }

    #[test]
    fn test_geometry_errors() {
        assert!(StitchError::invalid_grid("3 tiles for a 2x2 grid").is_geometry_error());
        assert!(StitchError::OverlapOutOfRange {
            overlap: 5,
            width: 10,
            height: 10
        }
        .is_geometry_error());
        assert!(!StitchError::LabelOverflow { tile: 3 }.is_geometry_error());
    }
}

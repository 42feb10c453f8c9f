//! Tile grid geometry.
//!
//! Every tile loses `overlap` pixels on each side; tiles on the outer edge
//! of the grid additionally lose the declared padding on their outer side.
//! Destination offsets are chosen so trimmed tiles abut exactly.

use crate::core::error::{StitchError, StitchResult};
use crate::core::types::{Padding, TileInfo, TileRegion};
use serde::{Deserialize, Serialize};

/// Where one tile's trimmed pixels come from and where they go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSlot {
    /// Row-major tile index.
    pub index: usize,
    /// Grid row (0-based).
    pub row: usize,
    /// Grid column (0-based).
    pub col: usize,
    /// Kept region in tile coordinates.
    pub source: TileRegion,
    /// Target region in assembled-plane coordinates.
    pub dest: TileRegion,
}

/// Geometry of a dense `x_nblocks` by `y_nblocks` grid of uniform tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    x_nblocks: usize,
    y_nblocks: usize,
    tile_width: u32,
    tile_height: u32,
    overlap: u32,
    padding: Padding,
}

impl GridLayout {
    /// Create a layout, rejecting overlaps or paddings that leave an empty tile.
    pub fn new(
        x_nblocks: usize,
        y_nblocks: usize,
        tile_width: u32,
        tile_height: u32,
        overlap: u32,
        padding: Padding,
    ) -> StitchResult<Self> {
        if x_nblocks == 0 || y_nblocks == 0 {
            return Err(StitchError::invalid_grid(format!(
                "grid of {}x{} blocks is empty",
                x_nblocks, y_nblocks
            )));
        }

        let double = overlap as u64 * 2;
        if double >= tile_width as u64 || double >= tile_height as u64 {
            return Err(StitchError::OverlapOutOfRange {
                overlap,
                width: tile_width,
                height: tile_height,
            });
        }

        let layout = Self {
            x_nblocks,
            y_nblocks,
            tile_width,
            tile_height,
            overlap,
            padding,
        };

        check_edge_padding("left/right", x_nblocks, layout.block_width(), padding.left, padding.right)?;
        check_edge_padding("top/bottom", y_nblocks, layout.block_height(), padding.top, padding.bottom)?;

        Ok(layout)
    }

    /// Create a layout for probed tiles, checking count and uniform shape.
    ///
    /// The first tile declares the shape every other tile must have.
    pub fn for_tiles(
        x_nblocks: usize,
        y_nblocks: usize,
        tiles: &[TileInfo],
        overlap: u32,
        padding: Padding,
    ) -> StitchResult<Self> {
        let first = tiles
            .first()
            .ok_or_else(|| StitchError::invalid_grid("no tiles found"))?;
        let layout = Self::new(x_nblocks, y_nblocks, first.width, first.height, overlap, padding)?;
        let shapes: Vec<_> = tiles.iter().map(|t| (t.width, t.height)).collect();
        layout.validate_tiles(&shapes)?;
        Ok(layout)
    }

    /// Check that `shapes` fills this grid with tiles of the declared shape.
    pub fn validate_tiles(&self, shapes: &[(u32, u32)]) -> StitchResult<()> {
        if shapes.len() != self.tile_count() {
            return Err(StitchError::invalid_grid(format!(
                "{} tiles cannot fill a {}x{} grid",
                shapes.len(),
                self.x_nblocks,
                self.y_nblocks
            )));
        }

        for (index, &(width, height)) in shapes.iter().enumerate() {
            if (width, height) != (self.tile_width, self.tile_height) {
                return Err(StitchError::invalid_grid(format!(
                    "tile {} is {}x{}, expected {}x{}",
                    index, width, height, self.tile_width, self.tile_height
                )));
            }
        }

        Ok(())
    }

    /// Number of tile columns.
    pub fn x_nblocks(&self) -> usize {
        self.x_nblocks
    }

    /// Number of tile rows.
    pub fn y_nblocks(&self) -> usize {
        self.y_nblocks
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.x_nblocks * self.y_nblocks
    }

    /// Untrimmed tile shape `(width, height)`.
    pub fn tile_shape(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    /// Overlap width in pixels.
    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    /// Outer padding.
    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Width of an interior tile after overlap trimming.
    pub fn block_width(&self) -> u32 {
        self.tile_width - 2 * self.overlap
    }

    /// Height of an interior tile after overlap trimming.
    pub fn block_height(&self) -> u32 {
        self.tile_height - 2 * self.overlap
    }

    /// `(width, height)` of the assembled plane.
    pub fn output_size(&self) -> (u32, u32) {
        let width = self.x_nblocks as u32 * self.block_width() - self.padding.left - self.padding.right;
        let height =
            self.y_nblocks as u32 * self.block_height() - self.padding.top - self.padding.bottom;
        (width, height)
    }

    /// Row-major index of the tile at `(row, col)`.
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.x_nblocks + col
    }

    /// `(row, col)` of the tile at `index`.
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.x_nblocks, index % self.x_nblocks)
    }

    /// Source and destination regions of the tile at `(row, col)`.
    pub fn slot(&self, row: usize, col: usize) -> TileSlot {
        let (src_x, dst_x, width) = axis_span(
            col,
            self.x_nblocks,
            self.block_width(),
            self.overlap,
            self.padding.left,
            self.padding.right,
        );
        let (src_y, dst_y, height) = axis_span(
            row,
            self.y_nblocks,
            self.block_height(),
            self.overlap,
            self.padding.top,
            self.padding.bottom,
        );

        TileSlot {
            index: self.index(row, col),
            row,
            col,
            source: TileRegion::new(src_x, src_y, width, height),
            dest: TileRegion::new(dst_x, dst_y, width, height),
        }
    }

    /// All slots in row-major order.
    pub fn slots(&self) -> impl Iterator<Item = TileSlot> + '_ {
        (0..self.y_nblocks)
            .flat_map(move |row| (0..self.x_nblocks).map(move |col| self.slot(row, col)))
    }

    /// `(left, right)` tile index pairs sharing a vertical border.
    pub fn horizontal_pairs(&self) -> Vec<(usize, usize)> {
        (0..self.y_nblocks)
            .flat_map(|row| {
                (0..self.x_nblocks.saturating_sub(1))
                    .map(move |col| (self.index(row, col), self.index(row, col + 1)))
            })
            .collect()
    }

    /// `(upper, lower)` tile index pairs sharing a horizontal border.
    pub fn vertical_pairs(&self) -> Vec<(usize, usize)> {
        (0..self.y_nblocks.saturating_sub(1))
            .flat_map(|row| {
                (0..self.x_nblocks)
                    .map(move |col| (self.index(row, col), self.index(row + 1, col)))
            })
            .collect()
    }
}

/// `(source start, destination start, kept length)` along one axis.
fn axis_span(index: usize, count: usize, block: u32, overlap: u32, lo: u32, hi: u32) -> (u32, u32, u32) {
    let lead = if index == 0 { lo } else { 0 };
    let trail = if index + 1 == count { hi } else { 0 };
    let dest = if index == 0 { 0 } else { index as u32 * block - lo };
    (overlap + lead, dest, block - lead - trail)
}

fn check_edge_padding(axis: &str, count: usize, block: u32, lo: u32, hi: u32) -> StitchResult<()> {
    let consumed = if count == 1 {
        lo as u64 + hi as u64 >= block as u64
    } else {
        lo >= block || hi >= block
    };

    if consumed {
        return Err(StitchError::invalid_grid(format!(
            "{} padding {},{} removes an entire {}px edge tile",
            axis, lo, hi, block
        )));
    }
    Ok(())
}

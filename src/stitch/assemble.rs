//! Plane assembly.
//!
//! Builds one assembled plane from one page of every tile. In label mode
//! each tile's nonzero labels are shifted past the largest label of the
//! tiles before it (row-major), so labels from different tiles never collide
//! before the border remap is applied.

use crate::core::error::{StitchError, StitchResult};
use crate::core::types::{AssemblyMode, Plane, Sample};
use crate::grid::layout::{GridLayout, TileSlot};
use crate::io::source::TileSource;
use image::ImageBuffer;
use num_traits::{NumCast, ToPrimitive};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-tile label offsets of one assembled plane, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOffsets {
    offsets: Vec<u32>,
}

impl TileOffsets {
    /// Offset added to the labels of the tile at `index`.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.offsets.get(index).copied()
    }

    /// All offsets in row-major order.
    pub fn as_slice(&self) -> &[u32] {
        &self.offsets
    }
}

/// Result of assembling one page.
#[derive(Debug, Clone)]
pub struct AssembledPlane<T: Sample> {
    /// The assembled pixels.
    pub plane: Plane<T>,
    /// Label offsets, present in label mode only.
    pub offsets: Option<TileOffsets>,
}

/// Assembles planes for a fixed grid layout.
#[derive(Debug, Clone)]
pub struct PlaneAssembler<'a> {
    layout: &'a GridLayout,
    mode: AssemblyMode,
    parallel: bool,
}

impl<'a> PlaneAssembler<'a> {
    /// Create an assembler that reads tiles in parallel.
    pub fn new(layout: &'a GridLayout, mode: AssemblyMode) -> Self {
        Self {
            layout,
            mode,
            parallel: true,
        }
    }

    /// Enable or disable parallel tile reads.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Assemble page `page` of every tile into a plane of `T`.
    ///
    /// Tiles of one grid row are read concurrently; offsets are always
    /// accumulated in row-major order.
    pub fn assemble<T: Sample>(&self, source: &dyn TileSource, page: usize) -> StitchResult<AssembledPlane<T>> {
        let (width, height) = self.layout.output_size();
        let mut plane: Plane<T> = ImageBuffer::new(width, height);
        let mut fold = self
            .mode
            .relabels()
            .then(|| OffsetFold::new(self.layout.tile_count()));

        for row in 0..self.layout.y_nblocks() {
            let tiles = self.read_row::<T>(source, row, page)?;

            for (col, mut tile) in tiles.into_iter().enumerate() {
                let slot = self.layout.slot(row, col);
                if let Some(fold) = fold.as_mut() {
                    fold.apply(slot.index, &mut tile)?;
                }
                copy_slot(&tile, &mut plane, &slot);
            }
        }

        let offsets = fold.map(|fold| TileOffsets {
            offsets: fold.offsets,
        });
        if let Some(offsets) = &offsets {
            log::debug!("page {}: label offsets {:?}", page, offsets.as_slice());
        }

        Ok(AssembledPlane { plane, offsets })
    }

    fn read_row<T: Sample>(&self, source: &dyn TileSource, row: usize, page: usize) -> StitchResult<Vec<Plane<T>>> {
        let read = |col: usize| self.read_tile::<T>(source, self.layout.index(row, col), page);
        let cols = 0..self.layout.x_nblocks();

        if self.parallel {
            cols.into_par_iter().map(read).collect()
        } else {
            cols.map(read).collect()
        }
    }

    fn read_tile<T: Sample>(&self, source: &dyn TileSource, index: usize, page: usize) -> StitchResult<Plane<T>> {
        let tile = source.read_plane(index, page)?;
        if tile.dimensions() != self.layout.tile_shape() {
            let (width, height) = tile.dimensions();
            let (expected_width, expected_height) = self.layout.tile_shape();
            return Err(StitchError::invalid_grid(format!(
                "tile {} page {} is {}x{}, expected {}x{}",
                source.describe(index),
                page,
                width,
                height,
                expected_width,
                expected_height
            )));
        }
        tile.into_plane::<T>()
    }
}

/// Running-maximum fold over tiles in row-major order.
struct OffsetFold {
    running: u64,
    offsets: Vec<u32>,
}

impl OffsetFold {
    fn new(tiles: usize) -> Self {
        Self {
            running: 0,
            offsets: Vec::with_capacity(tiles),
        }
    }

    fn apply<T: Sample>(&mut self, index: usize, tile: &mut Plane<T>) -> StitchResult<()> {
        let offset = self.running;
        let recorded = u32::try_from(offset).map_err(|_| StitchError::LabelOverflow { tile: index })?;
        let mut tile_max = 0u64;

        for pixel in tile.pixels_mut() {
            let raw = pixel.0[0].to_u64().unwrap_or(0);
            if raw == 0 {
                continue;
            }
            tile_max = tile_max.max(raw);
            if offset > 0 {
                pixel.0[0] = <T as NumCast>::from(raw + offset)
                    .ok_or(StitchError::LabelOverflow { tile: index })?;
            }
        }

        self.offsets.push(recorded);
        // An empty tile leaves the running maximum unchanged.
        if tile_max > 0 {
            self.running = offset + tile_max;
        }
        Ok(())
    }
}

/// Copy the slot's source rectangle of `tile` into its destination in `plane`.
fn copy_slot<T: Sample>(tile: &Plane<T>, plane: &mut Plane<T>, slot: &TileSlot) {
    let (src, dst) = (slot.source, slot.dest);
    let tile_width = tile.width() as usize;
    let plane_width = plane.width() as usize;
    let len = src.width as usize;

    let from_samples = tile.as_raw();
    let to_samples: &mut [T] = &mut *plane;

    for y in 0..src.height as usize {
        let from = (src.y as usize + y) * tile_width + src.x as usize;
        let to = (dst.y as usize + y) * plane_width + dst.x as usize;
        to_samples[to..to + len].copy_from_slice(&from_samples[from..from + len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Padding, PlaneData};
    use crate::io::source::MemoryTileSource;
    use image::Luma;

    fn tile_u16(width: u32, height: u32, f: impl Fn(u32, u32) -> u16) -> PlaneData {
        let plane: Plane<u16> = ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)]));
        plane.into()
    }

    #[test]
    fn test_zero_overlap_reproduces_tiles() {
        let tiles = (0..4u16)
            .map(|n| tile_u16(3, 2, move |x, y| n * 100 + (y * 3 + x) as u16))
            .collect();
        let source = MemoryTileSource::single_page(tiles);
        let layout = GridLayout::new(2, 2, 3, 2, 0, Padding::default()).unwrap();

        let assembled = PlaneAssembler::new(&layout, AssemblyMode::Intensity)
            .assemble::<u16>(&source, 0)
            .unwrap();
        assert!(assembled.offsets.is_none());
        assert_eq!(assembled.plane.dimensions(), (6, 4));
        assert_eq!(assembled.plane.get_pixel(0, 0).0[0], 0);
        assert_eq!(assembled.plane.get_pixel(4, 1).0[0], 100 + 4);
        assert_eq!(assembled.plane.get_pixel(2, 3).0[0], 200 + 5);
        assert_eq!(assembled.plane.get_pixel(5, 3).0[0], 300 + 5);
    }

    #[test]
    fn test_overlap_is_trimmed() {
        // Each tile carries its index everywhere except a 2px frame of 99s.
        let tiles = (0..4u16)
            .map(|n| {
                tile_u16(10, 10, move |x, y| {
                    if (2..8).contains(&x) && (2..8).contains(&y) {
                        n + 1
                    } else {
                        99
                    }
                })
            })
            .collect();
        let source = MemoryTileSource::single_page(tiles);
        let layout = GridLayout::new(2, 2, 10, 10, 2, Padding::default()).unwrap();

        let plane = PlaneAssembler::new(&layout, AssemblyMode::Intensity)
            .assemble::<u16>(&source, 0)
            .unwrap()
            .plane;
        assert_eq!(plane.dimensions(), (12, 12));
        assert!(plane.pixels().all(|p| p.0[0] != 99));
        assert_eq!(plane.get_pixel(5, 5).0[0], 1);
        assert_eq!(plane.get_pixel(6, 5).0[0], 2);
        assert_eq!(plane.get_pixel(5, 6).0[0], 3);
        assert_eq!(plane.get_pixel(11, 11).0[0], 4);
    }

    #[test]
    fn test_label_offsets_accumulate() {
        let tiles = vec![
            tile_u16(2, 2, |x, _| x as u16 * 3), // max 3
            tile_u16(2, 2, |_, _| 0),            // empty
            tile_u16(2, 2, |x, y| (x + y) as u16), // max 2
        ];
        let source = MemoryTileSource::single_page(tiles);
        let layout = GridLayout::new(3, 1, 2, 2, 0, Padding::default()).unwrap();

        let assembled = PlaneAssembler::new(&layout, AssemblyMode::Labels)
            .with_parallel(false)
            .assemble::<u32>(&source, 0)
            .unwrap();
        let offsets = assembled.offsets.unwrap();
        assert_eq!(offsets.as_slice(), &[0, 3, 3]);
        assert_eq!(offsets.get(2), Some(3));
        assert_eq!(offsets.get(3), None);

        let plane = assembled.plane;
        assert_eq!(plane.get_pixel(1, 0).0[0], 3);
        assert_eq!(plane.get_pixel(2, 0).0[0], 0);
        assert_eq!(plane.get_pixel(4, 0).0[0], 0);
        assert_eq!(plane.get_pixel(5, 0).0[0], 4);
        assert_eq!(plane.get_pixel(5, 1).0[0], 5);
    }

    #[test]
    fn test_label_overflow() {
        let full: Plane<u32> = ImageBuffer::from_pixel(2, 2, Luma([u32::MAX - 1]));
        let source = MemoryTileSource::single_page(vec![full.clone().into(), full.into()]);
        let layout = GridLayout::new(2, 1, 2, 2, 0, Padding::default()).unwrap();

        let result = PlaneAssembler::new(&layout, AssemblyMode::Labels).assemble::<u32>(&source, 0);
        assert!(matches!(result, Err(StitchError::LabelOverflow { tile: 1 })));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let tiles = (0..6u16)
            .map(|n| tile_u16(8, 6, move |x, y| (x * y) as u16 % 5 * (n + 1)))
            .collect();
        let source = MemoryTileSource::single_page(tiles);
        let layout = GridLayout::new(3, 2, 8, 6, 1, Padding::new(1, 0, 0, 1)).unwrap();
        let assembler = PlaneAssembler::new(&layout, AssemblyMode::Labels);

        let first = assembler.assemble::<u32>(&source, 0).unwrap();
        let second = assembler.with_parallel(false).assemble::<u32>(&source, 0).unwrap();
        assert_eq!(first.plane, second.plane);
        assert_eq!(first.offsets, second.offsets);
    }

    #[test]
    fn test_tile_shape_mismatch() {
        let source = MemoryTileSource::single_page(vec![
            tile_u16(4, 4, |_, _| 1),
            tile_u16(4, 3, |_, _| 1),
        ]);
        let layout = GridLayout::new(2, 1, 4, 4, 0, Padding::default()).unwrap();
        let result = PlaneAssembler::new(&layout, AssemblyMode::Intensity).assemble::<u16>(&source, 0);
        assert!(matches!(result, Err(StitchError::InvalidGrid { .. })));
    }

    #[test]
    fn test_missing_page_is_tile_read() {
        let source = MemoryTileSource::single_page(vec![tile_u16(4, 4, |_, _| 1)]);
        let layout = GridLayout::new(1, 1, 4, 4, 0, Padding::default()).unwrap();
        let result = PlaneAssembler::new(&layout, AssemblyMode::Labels).assemble::<u32>(&source, 1);
        assert!(matches!(result, Err(StitchError::TileRead { .. })));
    }
}

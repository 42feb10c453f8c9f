//! Tile readers.
//!
//! The stitching passes only see the [`TileSource`] trait: a row-major list
//! of multi-page tiles with random access by page. [`TiffTileSource`] reads
//! tiles from TIFF files on demand; [`MemoryTileSource`] holds decoded
//! planes and is used by tests and benchmarks.

use crate::core::error::{StitchError, StitchResult};
use crate::core::types::{PlaneData, SampleType, TileInfo};
use crate::grid::naming::TileSet;
use image::ImageBuffer;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::{SampleFormat, Tag};

/// Trait for tile sources.
///
/// Implementations must be safe to read from several threads at once; the
/// border remap pass reads many tile pairs in parallel.
pub trait TileSource: Send + Sync {
    /// Number of tiles.
    fn len(&self) -> usize;

    /// Whether the source has no tiles.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape, sample type and page count of a tile.
    fn info(&self, index: usize) -> StitchResult<TileInfo>;

    /// Decode one page of a tile.
    fn read_plane(&self, index: usize, page: usize) -> StitchResult<PlaneData>;

    /// Human-readable name of a tile for error messages.
    fn describe(&self, index: usize) -> String {
        format!("#{}", index)
    }
}

/// TIFF files on disk, one file per tile.
#[derive(Debug, Clone)]
pub struct TiffTileSource {
    paths: Vec<PathBuf>,
}

impl TiffTileSource {
    /// Create a source over row-major tile paths.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Create a source over the tiles of a discovered grid.
    pub fn from_tile_set(tiles: &TileSet) -> Self {
        Self::new(tiles.paths())
    }

    /// Path of the tile at `index`.
    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(|p| p.as_path())
    }

    fn open(&self, index: usize) -> StitchResult<(&Path, Decoder<BufReader<File>>)> {
        let path = self
            .path(index)
            .ok_or_else(|| StitchError::tile_read(format!("#{}", index), "no such tile"))?;
        let file = File::open(path).map_err(|e| StitchError::tile_read(path.display(), e))?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| StitchError::tile_read(path.display(), e))?
            .with_limits(Limits::unlimited());
        Ok((path, decoder))
    }
}

impl TileSource for TiffTileSource {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn info(&self, index: usize) -> StitchResult<TileInfo> {
        let (path, mut decoder) = self.open(index)?;
        let read_error = |e: tiff::TiffError| StitchError::tile_read(path.display(), e);

        let (width, height) = decoder.dimensions().map_err(read_error)?;
        let sample_type = gray_sample_type(&mut decoder).map_err(|e| StitchError::tile_read(path.display(), e))?;
        let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();

        let mut page_count = 1;
        while decoder.more_images() {
            decoder.next_image().map_err(read_error)?;
            page_count += 1;
        }

        Ok(TileInfo {
            width,
            height,
            sample_type,
            page_count,
            description,
        })
    }

    fn read_plane(&self, index: usize, page: usize) -> StitchResult<PlaneData> {
        let (path, mut decoder) = self.open(index)?;
        let read_error = |e: tiff::TiffError| {
            StitchError::tile_read(format!("{} (page {})", path.display(), page), e)
        };

        decoder.seek_to_image(page).map_err(read_error)?;
        gray_sample_type(&mut decoder)
            .map_err(|e| StitchError::tile_read(format!("{} (page {})", path.display(), page), e))?;
        let (width, height) = decoder.dimensions().map_err(read_error)?;

        let plane = match decoder.read_image().map_err(read_error)? {
            DecodingResult::U8(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::U8),
            DecodingResult::U16(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::U16),
            DecodingResult::U32(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::U32),
            DecodingResult::I8(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::I8),
            DecodingResult::I16(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::I16),
            DecodingResult::I32(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::I32),
            DecodingResult::F32(samples) => ImageBuffer::from_raw(width, height, samples).map(PlaneData::F32),
            _ => {
                return Err(StitchError::tile_read(
                    path.display(),
                    "only 8, 16 or 32-bit integer and 32-bit float samples are supported",
                ))
            }
        };

        plane.ok_or_else(|| {
            StitchError::tile_read(
                path.display(),
                format!("sample count does not match {}x{} page {}", width, height, page),
            )
        })
    }

    fn describe(&self, index: usize) -> String {
        self.path(index)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("#{}", index))
    }
}

/// Sample type of the current page, which must be single-channel gray.
fn gray_sample_type<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<SampleType, String> {
    let bits = match decoder.colortype().map_err(|e| e.to_string())? {
        tiff::ColorType::Gray(bits) => bits,
        other => return Err(format!("unsupported color type {:?}, expected single-channel gray", other)),
    };
    let format = decoder
        .find_tag_unsigned::<u16>(Tag::SampleFormat)
        .map_err(|e| e.to_string())?
        .map(SampleFormat::from_u16_exhaustive)
        .unwrap_or(SampleFormat::Uint);

    match (format, bits) {
        (SampleFormat::Uint, 8) => Ok(SampleType::U8),
        (SampleFormat::Uint, 16) => Ok(SampleType::U16),
        (SampleFormat::Uint, 32) => Ok(SampleType::U32),
        (SampleFormat::Int, 8) => Ok(SampleType::I8),
        (SampleFormat::Int, 16) => Ok(SampleType::I16),
        (SampleFormat::Int, 32) => Ok(SampleType::I32),
        (SampleFormat::IEEEFP, 32) => Ok(SampleType::F32),
        (format, bits) => Err(format!("unsupported {}-bit {:?} samples", bits, format)),
    }
}

/// In-memory tiles, each a list of pages.
#[derive(Debug, Clone, Default)]
pub struct MemoryTileSource {
    tiles: Vec<Vec<PlaneData>>,
    description: Option<String>,
}

impl MemoryTileSource {
    /// Create from row-major tiles, each given as its pages.
    pub fn new(tiles: Vec<Vec<PlaneData>>) -> Self {
        Self {
            tiles,
            description: None,
        }
    }

    /// Create from single-page tiles.
    pub fn single_page(tiles: Vec<PlaneData>) -> Self {
        Self::new(tiles.into_iter().map(|t| vec![t]).collect())
    }

    /// Attach a metadata block reported for every tile.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl TileSource for MemoryTileSource {
    fn len(&self) -> usize {
        self.tiles.len()
    }

    fn info(&self, index: usize) -> StitchResult<TileInfo> {
        let pages = self
            .tiles
            .get(index)
            .ok_or_else(|| StitchError::tile_read(format!("#{}", index), "no such tile"))?;
        let first = pages
            .first()
            .ok_or_else(|| StitchError::tile_read(format!("#{}", index), "tile has no pages"))?;
        let (width, height) = first.dimensions();

        Ok(TileInfo {
            width,
            height,
            sample_type: first.sample_type(),
            page_count: pages.len(),
            description: self.description.clone(),
        })
    }

    fn read_plane(&self, index: usize, page: usize) -> StitchResult<PlaneData> {
        self.tiles
            .get(index)
            .and_then(|pages| pages.get(page))
            .cloned()
            .ok_or_else(|| {
                StitchError::tile_read(format!("#{}", index), format!("no page {}", page))
            })
    }
}

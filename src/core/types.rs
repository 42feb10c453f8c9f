//! Pixel and geometry types shared by the stitching passes.
//!
//! Tile planes are single-channel `image::ImageBuffer`s. The set of sample
//! types is closed (8 to 32-bit integers and `f32`), so planes coming off
//! disk are carried in the [`PlaneData`] enum and converted to a concrete
//! [`Sample`] type once the assembly mode has decided the target type.

use crate::core::error::{StitchError, StitchResult};
use image::{ImageBuffer, Luma, Primitive};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single-channel plane with samples of type `T`.
pub type Plane<T> = ImageBuffer<Luma<T>, Vec<T>>;

/// Pixels discarded from the outer boundary of the tile grid only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Padding {
    /// Columns dropped from the leftmost tile column.
    pub left: u32,
    /// Columns dropped from the rightmost tile column.
    pub right: u32,
    /// Rows dropped from the top tile row.
    pub top: u32,
    /// Rows dropped from the bottom tile row.
    pub bottom: u32,
}

impl Padding {
    /// Create a padding from its four sides.
    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.right, self.top, self.bottom)
    }
}

impl FromStr for Padding {
    type Err = String;

    /// Parse `"left,right,top,bottom"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .map_err(|e| format!("invalid padding value '{}': {}", part.trim(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match values.as_slice() {
            [left, right, top, bottom] => Ok(Self::new(*left, *right, *top, *bottom)),
            _ => Err(format!(
                "padding needs 4 comma separated values (left,right,top,bottom), got {}",
                values.len()
            )),
        }
    }
}

/// How tiles are combined into the assembled plane.
///
/// This is the capability flag that decides the output sample type: label
/// data is widened to `u32` so per-tile offsets cannot wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// Plain intensity data: keep the tiles' sample type, no relabeling.
    Intensity,
    /// Segmentation labels: widen to `u32`, offset per tile, remap borders.
    #[default]
    Labels,
}

impl AssemblyMode {
    /// Whether the remap and relabel passes run in this mode.
    pub fn relabels(&self) -> bool {
        matches!(self, AssemblyMode::Labels)
    }

    /// Sample type of the assembled plane for tiles of type `source`.
    pub fn target_type(&self, source: SampleType) -> SampleType {
        match self {
            AssemblyMode::Intensity => source,
            AssemblyMode::Labels => SampleType::U32,
        }
    }
}

impl fmt::Display for AssemblyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyMode::Intensity => write!(f, "intensity"),
            AssemblyMode::Labels => write!(f, "labels"),
        }
    }
}

/// Supported grayscale sample types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// 8-bit unsigned.
    U8,
    /// 16-bit unsigned.
    U16,
    /// 32-bit unsigned.
    U32,
    /// 8-bit signed.
    I8,
    /// 16-bit signed.
    I16,
    /// 32-bit signed.
    I32,
    /// 32-bit IEEE float.
    F32,
}

impl SampleType {
    /// Bits per sample.
    pub fn bits(&self) -> u16 {
        match self {
            SampleType::U8 | SampleType::I8 => 8,
            SampleType::U16 | SampleType::I16 => 16,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 32,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SampleType::U8 | SampleType::U16 | SampleType::U32 => 'u',
            SampleType::I8 | SampleType::I16 | SampleType::I32 => 'i',
            SampleType::F32 => 'f',
        };
        write!(f, "{}{}", kind, self.bits())
    }
}

/// A single-channel plane in one of the supported sample types.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum PlaneData {
    U8(Plane<u8>),
    U16(Plane<u16>),
    U32(Plane<u32>),
    I8(Plane<i8>),
    I16(Plane<i16>),
    I32(Plane<i32>),
    F32(Plane<f32>),
}

/// Run `$body` with `$plane` bound to the typed plane of any variant.
macro_rules! with_plane {
    ($data:expr, $plane:ident => $body:expr) => {
        match $data {
            PlaneData::U8($plane) => $body,
            PlaneData::U16($plane) => $body,
            PlaneData::U32($plane) => $body,
            PlaneData::I8($plane) => $body,
            PlaneData::I16($plane) => $body,
            PlaneData::I32($plane) => $body,
            PlaneData::F32($plane) => $body,
        }
    };
}

impl PlaneData {
    /// Sample type of this plane.
    pub fn sample_type(&self) -> SampleType {
        match self {
            PlaneData::U8(_) => SampleType::U8,
            PlaneData::U16(_) => SampleType::U16,
            PlaneData::U32(_) => SampleType::U32,
            PlaneData::I8(_) => SampleType::I8,
            PlaneData::I16(_) => SampleType::I16,
            PlaneData::I32(_) => SampleType::I32,
            PlaneData::F32(_) => SampleType::F32,
        }
    }

    /// `(width, height)` of this plane.
    pub fn dimensions(&self) -> (u32, u32) {
        with_plane!(self, p => p.dimensions())
    }

    /// Convert into a plane of `T`, failing if a sample does not fit.
    ///
    /// Negative or non-finite samples never fit an unsigned type; float
    /// samples are truncated toward zero.
    pub fn into_plane<T: Sample>(self) -> StitchResult<Plane<T>> {
        with_plane!(self, p => cast_plane(p))
    }
}

macro_rules! impl_sample {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Plane<$ty>> for PlaneData {
                fn from(plane: Plane<$ty>) -> Self {
                    PlaneData::$variant(plane)
                }
            }

            impl Sample for $ty {
                const SAMPLE_TYPE: SampleType = SampleType::$variant;
            }
        )*
    };
}

/// A sample type the assembled plane can hold.
pub trait Sample: Primitive + Send + Sync + fmt::Debug + 'static {
    /// The matching [`SampleType`] tag.
    const SAMPLE_TYPE: SampleType;
}

impl_sample!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    f32 => F32,
);

fn cast_plane<S: Primitive, T: Sample>(plane: Plane<S>) -> StitchResult<Plane<T>> {
    let (width, height) = plane.dimensions();
    let samples = plane
        .into_raw()
        .into_iter()
        .map(|v| <T as NumCast>::from(v))
        .collect::<Option<Vec<T>>>()
        .ok_or_else(|| {
            StitchError::invalid_grid(format!(
                "tile samples do not fit in {}",
                T::SAMPLE_TYPE
            ))
        })?;

    ImageBuffer::from_raw(width, height, samples).ok_or_else(|| {
        StitchError::invalid_grid(format!(
            "sample buffer does not match {}x{} plane",
            width, height
        ))
    })
}

/// Shape and layout facts about one tile, read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Sample type of every page.
    pub sample_type: SampleType,
    /// Number of pages (channels, z-slices or timepoints).
    pub page_count: usize,
    /// Textual metadata block of the first page, if any.
    pub description: Option<String>,
}

/// Represents a rectangular region within a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRegion {
    /// X offset from the plane origin
    pub x: u32,
    /// Y offset from the plane origin
    pub y: u32,
    /// Width of the region
    pub width: u32,
    /// Height of the region
    pub height: u32,
}

impl TileRegion {
    /// Create a new tile region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get the right edge coordinate (exclusive).
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Get the bottom edge coordinate (exclusive).
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Calculate the area of this region in pixels.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check if this region is entirely within the given bounds.
    pub fn is_within_bounds(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Check if two regions share at least one pixel.
    pub fn intersects(&self, other: &TileRegion) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_parse() {
        let padding: Padding = "1,2,3,4".parse().unwrap();
        assert_eq!(padding, Padding::new(1, 2, 3, 4));
        assert_eq!(padding.to_string(), "1,2,3,4");

        let spaced: Padding = " 0, 0 ,5,0".parse().unwrap();
        assert_eq!(spaced.top, 5);
        assert_eq!(Padding::default(), Padding::new(0, 0, 0, 0));
    }

    #[test]
    fn test_padding_parse_errors() {
        assert!("1,2,3".parse::<Padding>().is_err());
        assert!("1,2,3,4,5".parse::<Padding>().is_err());
        assert!("1,-2,3,4".parse::<Padding>().is_err());
        assert!("a,b,c,d".parse::<Padding>().is_err());
    }

    #[test]
    fn test_assembly_mode_target_type() {
        assert_eq!(AssemblyMode::Labels.target_type(SampleType::U8), SampleType::U32);
        assert_eq!(AssemblyMode::Intensity.target_type(SampleType::U16), SampleType::U16);
        assert!(AssemblyMode::Labels.relabels());
        assert!(!AssemblyMode::Intensity.relabels());
    }

    #[test]
    fn test_widen_plane() {
        let plane: Plane<u16> = ImageBuffer::from_raw(2, 1, vec![7, 65535]).unwrap();
        let wide: Plane<u32> = PlaneData::from(plane).into_plane().unwrap();
        assert_eq!(wide.as_raw(), &vec![7u32, 65535]);
    }

    #[test]
    fn test_signed_labels_widen_to_u32() {
        let plane: Plane<i32> = ImageBuffer::from_raw(3, 1, vec![0, 7, i32::MAX]).unwrap();
        let wide: Plane<u32> = PlaneData::from(plane).into_plane().unwrap();
        assert_eq!(wide.as_raw(), &vec![0u32, 7, i32::MAX as u32]);
    }

    #[test]
    fn test_negative_label_is_error() {
        let plane: Plane<i16> = ImageBuffer::from_raw(2, 1, vec![3, -1]).unwrap();
        let result: StitchResult<Plane<u32>> = PlaneData::from(plane).into_plane();
        assert!(matches!(result, Err(StitchError::InvalidGrid { .. })));
    }

    #[test]
    fn test_float_samples_cast() {
        let plane: Plane<f32> = ImageBuffer::from_raw(2, 1, vec![2.0, 4.75]).unwrap();
        let data = PlaneData::from(plane);
        assert_eq!(data.sample_type(), SampleType::F32);
        let labels: Plane<u32> = data.clone().into_plane().unwrap();
        assert_eq!(labels.as_raw(), &vec![2u32, 4]);

        let nan: Plane<f32> = ImageBuffer::from_raw(1, 1, vec![f32::NAN]).unwrap();
        assert!(PlaneData::from(nan).into_plane::<u32>().is_err());
    }

    #[test]
    fn test_sample_type_display() {
        assert_eq!(SampleType::U16.to_string(), "u16");
        assert_eq!(SampleType::I32.to_string(), "i32");
        assert_eq!(SampleType::F32.to_string(), "f32");
        assert_eq!(SampleType::I8.bits(), 8);
    }

    #[test]
    fn test_narrowing_overflow_is_error() {
        let plane: Plane<u32> = ImageBuffer::from_raw(1, 1, vec![300]).unwrap();
        let narrowed: StitchResult<Plane<u8>> = PlaneData::from(plane).into_plane();
        assert!(narrowed.is_err());
    }

    #[test]
    fn test_tile_region() {
        let region = TileRegion::new(10, 20, 100, 200);
        assert_eq!(region.right(), 110);
        assert_eq!(region.bottom(), 220);
        assert_eq!(region.area(), 20000);
        assert!(region.is_within_bounds(110, 220));
        assert!(!region.is_within_bounds(109, 220));
    }

    #[test]
    fn test_tile_region_intersects() {
        let a = TileRegion::new(0, 0, 6, 6);
        let b = TileRegion::new(6, 0, 6, 6);
        let c = TileRegion::new(5, 5, 2, 2);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(b.intersects(&c));
    }
}

//! Plane writers.
//!
//! Planes are appended one page at a time in the order they are produced;
//! page order in the container is significant.

use crate::core::error::{StitchError, StitchResult};
use crate::core::types::PlaneData;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffKindBig, TiffValue};
use tiff::tags::Tag;
use tiff::TiffResult;

/// Trait for assembled plane destinations.
pub trait PlaneSink: Send {
    /// Append one plane, tagged with an optional metadata block.
    fn write_plane(&mut self, plane: &PlaneData, description: Option<&str>) -> StitchResult<()>;

    /// Finalize the destination. No plane may be written afterwards.
    fn finish(&mut self) -> StitchResult<()>;
}

/// Multi-page BigTIFF file, one page per plane.
///
/// Pages go to `<path>.partial`; [`PlaneSink::finish`] renames it to `path`.
/// A sink dropped before `finish` removes the partial file.
pub struct BigTiffSink {
    path: PathBuf,
    partial: PathBuf,
    encoder: Option<TiffEncoder<File, TiffKindBig>>,
    pages: usize,
}

impl BigTiffSink {
    /// Create the partial output file.
    pub fn create(path: impl AsRef<Path>) -> StitchResult<Self> {
        let path = path.as_ref().to_path_buf();
        let partial = partial_path(&path);
        let file = File::create(&partial).map_err(|e| output_error(&partial, e))?;
        let encoder = TiffEncoder::new_big(file).map_err(|e| output_error(&partial, e))?;

        Ok(Self {
            path,
            partial,
            encoder: Some(encoder),
            pages: 0,
        })
    }

    /// Number of pages written so far.
    pub fn pages(&self) -> usize {
        self.pages
    }
}

impl PlaneSink for BigTiffSink {
    fn write_plane(&mut self, plane: &PlaneData, description: Option<&str>) -> StitchResult<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| output_error(&self.path, "sink already finished"))?;

        let written = match plane {
            PlaneData::U8(p) => write_page::<colortype::Gray8>(encoder, p.width(), p.height(), p.as_raw(), description),
            PlaneData::U16(p) => write_page::<colortype::Gray16>(encoder, p.width(), p.height(), p.as_raw(), description),
            PlaneData::U32(p) => write_page::<colortype::Gray32>(encoder, p.width(), p.height(), p.as_raw(), description),
            PlaneData::I8(p) => write_page::<colortype::GrayI8>(encoder, p.width(), p.height(), p.as_raw(), description),
            PlaneData::I16(p) => write_page::<colortype::GrayI16>(encoder, p.width(), p.height(), p.as_raw(), description),
            PlaneData::I32(p) => write_page::<colortype::GrayI32>(encoder, p.width(), p.height(), p.as_raw(), description),
            PlaneData::F32(p) => write_page::<colortype::Gray32Float>(encoder, p.width(), p.height(), p.as_raw(), description),
        };
        written.map_err(|e| output_error(&self.partial, e))?;

        self.pages += 1;
        log::debug!("wrote page {} to {}", self.pages, self.partial.display());
        Ok(())
    }

    fn finish(&mut self) -> StitchResult<()> {
        // Dropping the encoder closes the file.
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| output_error(&self.path, "sink already finished"))?;
        drop(encoder);

        fs::rename(&self.partial, &self.path).map_err(|e| output_error(&self.path, e))?;
        log::info!("wrote {} page(s) to {}", self.pages, self.path.display());
        Ok(())
    }
}

impl Drop for BigTiffSink {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            drop(encoder);
            if let Err(e) = fs::remove_file(&self.partial) {
                log::warn!("could not remove {}: {}", self.partial.display(), e);
            }
        }
    }
}

fn write_page<C>(
    encoder: &mut TiffEncoder<File, TiffKindBig>,
    width: u32,
    height: u32,
    samples: &[C::Inner],
    description: Option<&str>,
) -> TiffResult<()>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(width, height)?;
    if let Some(text) = description {
        image.encoder().write_tag(Tag::ImageDescription, text)?;
    }
    image.write_data(samples)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("stitched"));
    name.push(".partial");
    path.with_file_name(name)
}

fn output_error(path: &Path, error: impl std::fmt::Display) -> StitchError {
    StitchError::Output {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

/// Collects planes in memory.
#[derive(Debug, Default)]
pub struct MemoryPlaneSink {
    /// Written planes with their metadata blocks, in page order.
    pub planes: Vec<(PlaneData, Option<String>)>,
    /// Whether `finish` was called.
    pub finished: bool,
}

impl MemoryPlaneSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaneSink for MemoryPlaneSink {
    fn write_plane(&mut self, plane: &PlaneData, description: Option<&str>) -> StitchResult<()> {
        if self.finished {
            return Err(output_error(Path::new("<memory>"), "sink already finished"));
        }
        self.planes.push((plane.clone(), description.map(str::to_string)));
        Ok(())
    }

    fn finish(&mut self) -> StitchResult<()> {
        self.finished = true;
        Ok(())
    }
}

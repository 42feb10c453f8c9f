//! Stitching engine implementation.
//!
//! The engine drives a whole run: it validates the grid, resolves the border
//! remap table once (label mode only), then assembles, relabels and writes
//! one plane per page. Only one assembled plane is alive at a time.

use crate::core::error::{StitchError, StitchResult};
use crate::core::types::{AssemblyMode, Padding, PlaneData, SampleType, TileInfo};
use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
use crate::grid::layout::GridLayout;
use crate::io::metadata::output_description;
use crate::io::sink::PlaneSink;
use crate::io::source::TileSource;
use crate::stitch::assemble::PlaneAssembler;
use crate::stitch::relabel::relabel;
use crate::stitch::remap::{RemapResolver, RemapTable};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stitching options.
#[derive(Clone)]
pub struct StitchOptions {
    /// Overlap width in pixels, trimmed from every side of every tile.
    pub overlap: u32,
    /// Extra pixels trimmed from the outer boundary of the grid.
    pub padding: Padding,
    /// Whether tiles hold labels or intensities.
    pub mode: AssemblyMode,
    /// Whether to read tiles and resolve borders in parallel.
    pub parallel: bool,
    /// Maximum number of parallel threads (0 = use all available).
    pub max_threads: usize,
    /// Progress callback.
    pub progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for StitchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StitchOptions")
            .field("overlap", &self.overlap)
            .field("padding", &self.padding)
            .field("mode", &self.mode)
            .field("parallel", &self.parallel)
            .field("max_threads", &self.max_threads)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            overlap: 0,
            padding: Padding::default(),
            mode: AssemblyMode::default(),
            parallel: true,
            max_threads: 0, // Use all available
            progress_callback: None,
        }
    }
}

impl StitchOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overlap width.
    pub fn with_overlap(mut self, overlap: u32) -> Self {
        self.overlap = overlap;
        self
    }

    /// Set the outer padding.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Set the assembly mode.
    pub fn with_mode(mut self, mode: AssemblyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable/disable parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct StitchSummary {
    /// Number of planes written.
    pub pages: usize,
    /// `(width, height)` of every plane.
    pub output_size: (u32, u32),
    /// Sample type of the written planes.
    pub sample_type: SampleType,
    /// Number of tiles with a remap entry.
    pub remap_entries: usize,
    /// Pixels changed by relabeling, over all planes.
    pub relabeled_pixels: usize,
    /// Wall time of the run.
    pub total_duration: Duration,
    /// The remap table, in label mode.
    pub remap: Option<RemapTable>,
}

/// The stitching engine.
#[derive(Debug, Clone, Default)]
pub struct StitchEngine {
    options: StitchOptions,
}

impl StitchEngine {
    /// Create an engine with the given options.
    pub fn new(options: StitchOptions) -> Self {
        Self { options }
    }

    /// Stitch the row-major tiles of `source`, laid out as `x_nblocks`
    /// columns by `y_nblocks` rows, and write every page to `sink`.
    ///
    /// The sink is finished only if every page was written.
    pub fn run(
        &self,
        source: &dyn TileSource,
        x_nblocks: usize,
        y_nblocks: usize,
        sink: &mut dyn PlaneSink,
    ) -> StitchResult<StitchSummary> {
        let mut tracker = ProgressTracker::default();
        if let Some(callback) = &self.options.progress_callback {
            let callback = callback.clone();
            tracker = tracker.with_callback(Box::new(move |update| callback(update)));
        }

        let result = match self.options.max_threads {
            0 => self.execute(source, x_nblocks, y_nblocks, sink, &mut tracker),
            threads => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| StitchError::Io(std::io::Error::other(e)))
                .and_then(|pool| {
                    pool.install(|| self.execute(source, x_nblocks, y_nblocks, sink, &mut tracker))
                }),
        };

        if let Err(error) = &result {
            log::debug!("stitching failed: {}", error);
            tracker.report_error(error.to_string());
        }
        result
    }

    fn execute(
        &self,
        source: &dyn TileSource,
        x_nblocks: usize,
        y_nblocks: usize,
        sink: &mut dyn PlaneSink,
        tracker: &mut ProgressTracker,
    ) -> StitchResult<StitchSummary> {
        let options = &self.options;
        let start_time = Instant::now();

        let infos = self.probe(source)?;
        let layout = GridLayout::for_tiles(x_nblocks, y_nblocks, &infos, options.overlap, options.padding)?;
        let (sample_type, pages) = uniform_pages(source, &infos)?;
        let target_type = options.mode.target_type(sample_type);
        let (width, height) = layout.output_size();
        let description = infos
            .first()
            .and_then(|info| output_description(info.description.as_deref(), width, height));

        log::info!(
            "stitching {}x{} grid of {}x{} tiles into {}x{} {} ({} page(s), {} mode, overlap {}, padding {})",
            x_nblocks,
            y_nblocks,
            layout.tile_shape().0,
            layout.tile_shape().1,
            width,
            height,
            target_type,
            pages,
            options.mode,
            options.overlap,
            options.padding
        );

        tracker.start(layout.tile_count(), pages);

        let remap = if options.mode.relabels() {
            let resolver = RemapResolver::new(&layout).with_parallel(options.parallel);
            let table = resolver.resolve(source)?;
            log::info!(
                "remap table: {} tile(s), {} label correspondence(s)",
                table.len(),
                table.mapping_count()
            );
            tracker.remap_resolved(resolver.tasks().len(), table.len());
            Some(table)
        } else {
            None
        };

        let assembler = PlaneAssembler::new(&layout, options.mode).with_parallel(options.parallel);
        let mut relabeled_pixels = 0;

        for page in 0..pages {
            tracker.plane_started(page);
            let page_start = Instant::now();

            let (plane, changed) = self.produce_plane(&assembler, &layout, remap.as_ref(), source, page, sample_type)?;
            sink.write_plane(&plane, description.as_deref())?;
            relabeled_pixels += changed;

            let duration = page_start.elapsed();
            log::debug!(
                "page {}/{} written in {:?} ({} pixel(s) relabeled)",
                page + 1,
                pages,
                duration,
                changed
            );
            tracker.plane_completed(page, duration.as_millis() as u64);
        }

        sink.finish()?;
        tracker.complete();

        let total_duration = start_time.elapsed();
        log::info!("stitched {} page(s) in {:?}", pages, total_duration);

        Ok(StitchSummary {
            pages,
            output_size: (width, height),
            sample_type: target_type,
            remap_entries: remap.as_ref().map(|r| r.len()).unwrap_or(0),
            relabeled_pixels,
            total_duration,
            remap,
        })
    }

    /// Read shape, sample type and page count of every tile.
    fn probe(&self, source: &dyn TileSource) -> StitchResult<Vec<TileInfo>> {
        if self.options.parallel {
            (0..source.len()).into_par_iter().map(|i| source.info(i)).collect()
        } else {
            (0..source.len()).map(|i| source.info(i)).collect()
        }
    }

    fn produce_plane(
        &self,
        assembler: &PlaneAssembler<'_>,
        layout: &GridLayout,
        remap: Option<&RemapTable>,
        source: &dyn TileSource,
        page: usize,
        sample_type: SampleType,
    ) -> StitchResult<(PlaneData, usize)> {
        match self.options.mode {
            AssemblyMode::Labels => {
                let assembled = assembler.assemble::<u32>(source, page)?;
                let mut plane = assembled.plane;
                let changed = match (remap, &assembled.offsets) {
                    (Some(remap), Some(offsets)) => relabel(&mut plane, remap, offsets, layout)?,
                    _ => 0,
                };
                Ok((plane.into(), changed))
            }
            AssemblyMode::Intensity => {
                let plane = match sample_type {
                    SampleType::U8 => assembler.assemble::<u8>(source, page)?.plane.into(),
                    SampleType::U16 => assembler.assemble::<u16>(source, page)?.plane.into(),
                    SampleType::U32 => assembler.assemble::<u32>(source, page)?.plane.into(),
                    SampleType::I8 => assembler.assemble::<i8>(source, page)?.plane.into(),
                    SampleType::I16 => assembler.assemble::<i16>(source, page)?.plane.into(),
                    SampleType::I32 => assembler.assemble::<i32>(source, page)?.plane.into(),
                    SampleType::F32 => assembler.assemble::<f32>(source, page)?.plane.into(),
                };
                Ok((plane, 0))
            }
        }
    }
}

/// Sample type and page count shared by every tile.
fn uniform_pages(source: &dyn TileSource, infos: &[TileInfo]) -> StitchResult<(SampleType, usize)> {
    let first = infos
        .first()
        .ok_or_else(|| StitchError::invalid_grid("no tiles found"))?;

    for (index, info) in infos.iter().enumerate().skip(1) {
        if info.sample_type != first.sample_type {
            return Err(StitchError::invalid_grid(format!(
                "tile {} holds {} samples, first tile holds {}",
                source.describe(index),
                info.sample_type,
                first.sample_type
            )));
        }
        if info.page_count != first.page_count {
            return Err(StitchError::invalid_grid(format!(
                "tile {} has {} page(s), first tile has {}",
                source.describe(index),
                info.page_count,
                first.page_count
            )));
        }
    }

    Ok((first.sample_type, first.page_count))
}

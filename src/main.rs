//! tilestitch CLI
//!
//! Stitches a directory of grid-named tiles into one multi-page BigTIFF.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tilestitch::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "tilestitch", version, about = "Stitch overlapping microscopy tiles into one image")]
struct Cli {
    /// Directory holding tiles named like `R1_X001_Y001.tif`
    #[arg(short, long)]
    input: PathBuf,

    /// Output BigTIFF path
    #[arg(short, long)]
    output: PathBuf,

    /// Overlap between adjacent tiles in pixels
    #[arg(short = 'v', long, default_value_t = 0)]
    overlap: u32,

    /// Pixels trimmed from the outer grid boundary as `left,right,top,bottom`
    #[arg(short, long, default_value = "0,0,0,0")]
    padding: Padding,

    /// Whether tiles hold segmentation labels or intensities
    #[arg(long, value_enum, default_value_t = ModeArg::Labels)]
    mode: ModeArg,

    /// Acquisition cycle to stitch when tiles of several cycles are present
    #[arg(long)]
    cycle: Option<u32>,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Run every pass on the calling thread
    #[arg(long)]
    sequential: bool,

    /// Write the border remap table as JSON
    #[arg(long, value_name = "JSON")]
    dump_remap: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Labels,
    Intensity,
}

impl From<ModeArg> for AssemblyMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Labels => AssemblyMode::Labels,
            ModeArg::Intensity => AssemblyMode::Intensity,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            let geometry = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<StitchError>())
                .any(StitchError::is_geometry_error);
            if geometry {
                log::error!("check the tile names and the --overlap/--padding values");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let tiles = TileSet::from_directory(&cli.input, cli.cycle)
        .with_context(|| format!("Failed to collect tiles from {}", cli.input.display()))?;
    log::info!(
        "found {} tile(s) in a {}x{} grid",
        tiles.tiles().len(),
        tiles.x_nblocks(),
        tiles.y_nblocks()
    );

    let options = StitchOptions::new()
        .with_overlap(cli.overlap)
        .with_padding(cli.padding)
        .with_mode(cli.mode.into())
        .with_parallel(!cli.sequential)
        .with_max_threads(cli.threads)
        .with_progress(log_progress);

    let source = TiffTileSource::from_tile_set(&tiles);
    let mut sink = BigTiffSink::create(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;

    let summary = StitchEngine::new(options)
        .run(&source, tiles.x_nblocks(), tiles.y_nblocks(), &mut sink)
        .context("Stitching failed")?;

    if let Some(path) = &cli.dump_remap {
        let remap = summary.remap.clone().unwrap_or_default();
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &remap)
            .with_context(|| format!("Failed to write remap table to {}", path.display()))?;
        log::info!("remap table written to {}", path.display());
    }

    log::info!(
        "{}: {} page(s), {}x{} {}, {} remapped tile(s), {} relabeled pixel(s) in {:.2?}",
        cli.output.display(),
        summary.pages,
        summary.output_size.0,
        summary.output_size.1,
        summary.sample_type,
        summary.remap_entries,
        summary.relabeled_pixels,
        summary.total_duration
    );
    Ok(())
}

fn log_progress(update: ProgressUpdate) {
    match update {
        ProgressUpdate::RemapResolved { tasks, entries } => {
            log::info!("resolved {} border(s), {} tile(s) remapped", tasks, entries)
        }
        ProgressUpdate::PlaneCompleted {
            page,
            total,
            duration_ms,
        } => log::info!("plane {}/{} done in {} ms", page + 1, total, duration_ms),
        ProgressUpdate::Progress {
            percent,
            estimated_remaining_ms: Some(remaining),
            ..
        } => log::debug!("{:.0}% done, ~{} ms remaining", percent, remaining),
        ProgressUpdate::Error { message } => log::debug!("run aborted: {}", message),
        _ => {}
    }
}

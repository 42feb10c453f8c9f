//! End-to-end runs over TIFF tiles on disk.

use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tilestitch::prelude::*;

const OME: &str = r#"<OME><Image><Pixels SizeX="10" SizeY="10" PhysicalSizeXUnit="um"/></Image></OME>"#;

/// Write a multi-page 16-bit tile; the first page carries `description`.
fn write_tile(path: &Path, pages: &[Vec<u16>], width: u32, height: u32, description: Option<&str>) {
    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    for (n, samples) in pages.iter().enumerate() {
        let mut image = encoder.new_image::<colortype::Gray16>(width, height).unwrap();
        if let (0, Some(text)) = (n, description) {
            image.encoder().write_tag(Tag::ImageDescription, text).unwrap();
        }
        image.write_data(samples).unwrap();
    }
}

/// Write a single-page tile of any gray color type.
fn write_plain<C>(path: &Path, samples: &[C::Inner], width: u32, height: u32)
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    encoder.write_image::<C>(width, height, samples).unwrap();
}

fn filled(width: u32, height: u32, f: impl Fn(u32, u32) -> u16) -> Vec<u16> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| f(x, y))
        .collect()
}

/// 2x2 grid of 10x10 two-page tiles. Label 5 straddles the border between
/// the two tiles of the top row.
fn write_grid(dir: &Path) {
    for row in 1..=2u32 {
        for col in 1..=2u32 {
            let labels = filled(10, 10, |x, y| match (row, col) {
                (1, 1) if x >= 6 && y < 5 => 5,
                (1, 2) if x < 4 && y < 5 => 5,
                (2, _) if y >= 6 => 1,
                _ => 0,
            });
            let intensity = filled(10, 10, |x, y| (100 * row + 10 * col) as u16 + (x + y) as u16);
            let name = format!("R1_X{:03}_Y{:03}.tif", col, row);
            let description = (row, col) == (1, 1);
            write_tile(
                &dir.join(name),
                &[labels, intensity],
                10,
                10,
                description.then_some(OME),
            );
        }
    }
    std::fs::write(dir.join("notes.txt"), "not a tile").unwrap();
}

fn read_pages(path: &Path) -> Vec<(u32, u32, DecodingResult, Option<String>)> {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().unwrap();
        let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();
        let data = decoder.read_image().unwrap();
        pages.push((width, height, data, description));
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().unwrap();
    }
    pages
}

#[test]
fn stitches_label_grid_to_bigtiff() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path());
    let output = dir.path().join("out").with_extension("ome.tif");

    let tiles = TileSet::from_directory(dir.path(), None).unwrap();
    assert_eq!((tiles.x_nblocks(), tiles.y_nblocks()), (2, 2));
    let source = TiffTileSource::from_tile_set(&tiles);
    let mut sink = BigTiffSink::create(&output).unwrap();

    let summary = StitchEngine::new(StitchOptions::new().with_overlap(2))
        .run(&source, tiles.x_nblocks(), tiles.y_nblocks(), &mut sink)
        .unwrap();
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.output_size, (12, 12));
    assert_eq!(summary.sample_type, SampleType::U32);

    let pages = read_pages(&output);
    assert_eq!(pages.len(), 2);

    let (width, height, data, description) = &pages[0];
    assert_eq!((*width, *height), (12, 12));
    let description = description.as_deref().unwrap();
    assert!(description.contains(r#"SizeX="12" SizeY="12""#));
    assert!(description.contains(r#"PhysicalSizeXUnit="um""#));

    match data {
        DecodingResult::U32(samples) => {
            let at = |x: usize, y: usize| samples[y * 12 + x];
            // The straddling object keeps one label across the seam.
            assert_eq!(at(5, 0), 5);
            assert_eq!(at(6, 0), 5);
            // Bottom row: tile 2 is offset to 11, tile 3 to 12 and joined back to 11.
            assert_eq!(at(0, 11), 11);
            assert_eq!(at(11, 11), 11);
        }
        other => panic!("expected 32-bit samples, got {:?}", std::mem::discriminant(other)),
    }
}

#[test]
fn stitches_intensity_grid_without_offsets() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path());
    let output = dir.path().join("intensity.tif");

    let tiles = TileSet::from_directory(dir.path(), Some(1)).unwrap();
    let source = TiffTileSource::from_tile_set(&tiles);
    let mut sink = BigTiffSink::create(&output).unwrap();
    let options = StitchOptions::new()
        .with_overlap(2)
        .with_mode(AssemblyMode::Intensity)
        .with_parallel(false);

    StitchEngine::new(options)
        .run(&source, tiles.x_nblocks(), tiles.y_nblocks(), &mut sink)
        .unwrap();

    let pages = read_pages(&output);
    match &pages[1].2 {
        DecodingResult::U16(samples) => {
            // Output (0, 0) is tile X1 Y1 at (2, 2).
            assert_eq!(samples[0], 110 + 4);
            // Output (11, 11) is tile X2 Y2 at (7, 7).
            assert_eq!(samples[11 * 12 + 11], 220 + 14);
        }
        other => panic!("expected 16-bit samples, got {:?}", std::mem::discriminant(other)),
    }
}

#[test]
fn failed_run_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path());
    let output = dir.path().join("out.tif");

    let tiles = TileSet::from_directory(dir.path(), None).unwrap();
    let source = TiffTileSource::from_tile_set(&tiles);
    let result = {
        let mut sink = BigTiffSink::create(&output).unwrap();
        StitchEngine::new(StitchOptions::new().with_overlap(5)).run(&source, 2, 2, &mut sink)
    };

    assert!(matches!(result, Err(StitchError::OverlapOutOfRange { .. })));
    assert!(!output.exists());
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_tile_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_grid(dir.path());
    std::fs::remove_file(dir.path().join("R1_X002_Y002.tif")).unwrap();

    let result = TileSet::from_directory(dir.path(), None);
    assert!(matches!(result, Err(StitchError::InvalidGrid { .. })));
}

#[test]
fn stitches_signed_label_tiles() {
    let dir = tempfile::tempdir().unwrap();
    // Label 7 covers the right of X1 and the left of X2, across the overlap.
    let left: Vec<i32> = (0..100).map(|i| if i % 10 >= 4 { 7 } else { 0 }).collect();
    let right: Vec<i32> = (0..100).map(|i| if i % 10 <= 5 { 7 } else { 0 }).collect();
    write_plain::<colortype::GrayI32>(&dir.path().join("X1_Y1.tif"), &left, 10, 10);
    write_plain::<colortype::GrayI32>(&dir.path().join("X2_Y1.tif"), &right, 10, 10);
    let output = dir.path().join("labels.tif");

    let tiles = TileSet::from_directory(dir.path(), None).unwrap();
    let source = TiffTileSource::from_tile_set(&tiles);
    assert_eq!(source.info(0).unwrap().sample_type, SampleType::I32);
    let mut sink = BigTiffSink::create(&output).unwrap();

    let summary = StitchEngine::new(StitchOptions::new().with_overlap(1))
        .run(&source, tiles.x_nblocks(), tiles.y_nblocks(), &mut sink)
        .unwrap();
    assert_eq!(summary.output_size, (16, 8));
    assert_eq!(summary.sample_type, SampleType::U32);
    assert_eq!(summary.remap_entries, 1);

    let pages = read_pages(&output);
    match &pages[0].2 {
        DecodingResult::U32(samples) => {
            let at = |x: usize, y: usize| samples[y * 16 + x];
            assert_eq!(at(0, 0), 0);
            // Tile X2 was offset to 14 and joined back to 7.
            assert_eq!(at(7, 3), 7);
            assert_eq!(at(8, 3), 7);
            assert_eq!(at(15, 7), 0);
            assert!(samples.iter().all(|&v| v == 0 || v == 7));
        }
        other => panic!("expected 32-bit samples, got {:?}", std::mem::discriminant(other)),
    }
}

#[test]
fn negative_labels_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let samples: Vec<i16> = (0..16).map(|i| if i == 5 { -3 } else { 1 }).collect();
    write_plain::<colortype::GrayI16>(&dir.path().join("X1_Y1.tif"), &samples, 4, 4);
    let output = dir.path().join("labels.tif");

    let tiles = TileSet::from_directory(dir.path(), None).unwrap();
    let source = TiffTileSource::from_tile_set(&tiles);
    let result = {
        let mut sink = BigTiffSink::create(&output).unwrap();
        StitchEngine::new(StitchOptions::new()).run(&source, 1, 1, &mut sink)
    };

    assert!(matches!(result, Err(StitchError::InvalidGrid { .. })));
    assert!(!output.exists());
}

#[test]
fn float_intensity_tiles_keep_their_type() {
    let dir = tempfile::tempdir().unwrap();
    for col in 1..=2u32 {
        let samples: Vec<f32> = (0..16).map(|i| col as f32 + i as f32 * 0.25).collect();
        write_plain::<colortype::Gray32Float>(&dir.path().join(format!("X{}_Y1.tif", col)), &samples, 4, 4);
    }
    let output = dir.path().join("intensity.tif");

    let tiles = TileSet::from_directory(dir.path(), None).unwrap();
    let source = TiffTileSource::from_tile_set(&tiles);
    let mut sink = BigTiffSink::create(&output).unwrap();
    let summary = StitchEngine::new(StitchOptions::new().with_mode(AssemblyMode::Intensity))
        .run(&source, 2, 1, &mut sink)
        .unwrap();
    assert_eq!(summary.sample_type, SampleType::F32);

    let pages = read_pages(&output);
    match &pages[0].2 {
        DecodingResult::F32(samples) => {
            assert_eq!(samples.len(), 8 * 4);
            assert_eq!(samples[0], 1.0);
            assert_eq!(samples[4], 2.0);
            assert_eq!(samples[8 * 3 + 7], 2.0 + 15.0 * 0.25);
        }
        other => panic!("expected float samples, got {:?}", std::mem::discriminant(other)),
    }
}

//! Global relabeling of an assembled label plane.
//!
//! Each tile with a remap entry has its labels rewritten to the labels of
//! its left and upper neighbours, shifted by both tiles' offsets for the
//! current plane. Replacements behave like successive whole-region
//! substitutions in insertion order, horizontal before vertical: a value
//! produced by an earlier substitution can be matched by a later one.

use crate::core::error::{Direction, StitchError, StitchResult};
use crate::core::types::{Plane, TileRegion};
use crate::grid::layout::GridLayout;
use crate::stitch::assemble::TileOffsets;
use crate::stitch::remap::{RemapTable, TileRemap};
use std::collections::HashMap;

/// Apply `remap` to `plane` in place.
///
/// Returns the number of pixels whose value changed.
pub fn relabel(
    plane: &mut Plane<u32>,
    remap: &RemapTable,
    offsets: &TileOffsets,
    layout: &GridLayout,
) -> StitchResult<usize> {
    if plane.dimensions() != layout.output_size() {
        return Err(StitchError::invalid_grid(format!(
            "plane is {}x{}, layout expects {:?}",
            plane.width(),
            plane.height(),
            layout.output_size()
        )));
    }

    let mut changed = 0;
    for (index, entry) in remap.iter() {
        if index >= layout.tile_count() {
            return Err(StitchError::invalid_grid(format!(
                "remap entry for tile {} outside a {}-tile grid",
                index,
                layout.tile_count()
            )));
        }

        let substitutions = tile_substitutions(index, entry, offsets, layout)?;
        let lookup = compose(&substitutions);
        if lookup.is_empty() {
            continue;
        }

        let (row, col) = layout.position(index);
        let region = layout.slot(row, col).dest;
        let count = apply(plane, region, &lookup);
        log::debug!(
            "tile {}: {} substitution(s), {} pixel(s) relabeled",
            index,
            substitutions.len(),
            count
        );
        changed += count;
    }

    Ok(changed)
}

/// Offset-shifted `(old, new)` pairs of one tile, in application order.
fn tile_substitutions(
    index: usize,
    entry: &TileRemap,
    offsets: &TileOffsets,
    layout: &GridLayout,
) -> StitchResult<Vec<(u32, u32)>> {
    let (row, col) = layout.position(index);
    let offset_of = |index: usize| {
        offsets.get(index).ok_or_else(|| {
            StitchError::invalid_grid(format!("no label offset recorded for tile {}", index))
        })
    };
    let this = offset_of(index)?;

    let mut substitutions = Vec::with_capacity(entry.horizontal.len() + entry.vertical.len());
    let neighbours = [
        (Direction::Horizontal, col > 0, index.wrapping_sub(1)),
        (Direction::Vertical, row > 0, index.wrapping_sub(layout.x_nblocks())),
    ];

    for (direction, present, neighbour) in neighbours {
        if !present {
            continue;
        }
        let other = offset_of(neighbour)?;
        for (&old, &new) in entry.get(direction) {
            // A label past u32::MAX cannot occur in this tile.
            let Some(old) = old.checked_add(this) else {
                continue;
            };
            let new = new
                .checked_add(other)
                .ok_or(StitchError::LabelOverflow { tile: neighbour })?;
            substitutions.push((old, new));
        }
    }

    Ok(substitutions)
}

/// Collapse sequential substitutions into a single lookup.
///
/// Walking the list backwards, each `old` maps to wherever its `new` ends up
/// under the substitutions that follow it.
fn compose(substitutions: &[(u32, u32)]) -> HashMap<u32, u32> {
    let mut lookup: HashMap<u32, u32> = HashMap::with_capacity(substitutions.len());
    for &(old, new) in substitutions.iter().rev() {
        let end = lookup.get(&new).copied().unwrap_or(new);
        lookup.insert(old, end);
    }
    lookup.retain(|start, end| start != end);
    lookup
}

fn apply(plane: &mut Plane<u32>, region: TileRegion, lookup: &HashMap<u32, u32>) -> usize {
    let width = plane.width() as usize;
    let samples: &mut [u32] = &mut *plane;
    let mut changed = 0;

    for y in region.y as usize..region.bottom() as usize {
        let start = y * width + region.x as usize;
        for sample in &mut samples[start..start + region.width as usize] {
            if let Some(&new) = lookup.get(&*sample) {
                *sample = new;
                changed += 1;
            }
        }
    }

    changed
}

//! Border remap resolution.
//!
//! Adjacent tiles see the same objects in their shared overlap strip but
//! label them independently. For every adjacent pair the strip is scanned
//! once and each label of the right/lower tile is mapped to the label the
//! left/upper tile has at the first position where both are nonzero.
//!
//! Pairs are independent, so they are resolved as one parallel task list
//! and merged by tile index afterwards. Mappings are not chained across
//! borders.

use crate::core::error::{Direction, StitchError, StitchResult};
use crate::core::types::Plane;
use crate::grid::layout::GridLayout;
use crate::io::source::TileSource;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label correspondences `old → new`, in first-seen order.
pub type LabelMap = IndexMap<u32, u32>;

/// Correspondences of one tile against its left and upper neighbours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRemap {
    /// Labels of this tile mapped to labels of the tile on its left.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub horizontal: LabelMap,
    /// Labels of this tile mapped to labels of the tile above.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub vertical: LabelMap,
}

impl TileRemap {
    /// Mapping for one border direction.
    pub fn get(&self, direction: Direction) -> &LabelMap {
        match direction {
            Direction::Horizontal => &self.horizontal,
            Direction::Vertical => &self.vertical,
        }
    }

    /// Whether neither direction has a correspondence.
    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty() && self.vertical.is_empty()
    }
}

/// Grid-wide remap table keyed by row-major tile index.
///
/// Tiles without any correspondence have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemapTable {
    entries: BTreeMap<usize, TileRemap>,
}

impl RemapTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `map` as the `direction` mapping of tile `index`.
    ///
    /// Empty maps are ignored. The other direction of the entry is kept,
    /// and labels already mapped in this direction keep their first target.
    pub fn insert(&mut self, index: usize, direction: Direction, map: LabelMap) {
        if map.is_empty() {
            return;
        }
        let entry = self.entries.entry(index).or_default();
        let slot = match direction {
            Direction::Horizontal => &mut entry.horizontal,
            Direction::Vertical => &mut entry.vertical,
        };
        for (old, new) in map {
            slot.entry(old).or_insert(new);
        }
    }

    /// Entry of tile `index`.
    pub fn get(&self, index: usize) -> Option<&TileRemap> {
        self.entries.get(&index)
    }

    /// Number of tiles with an entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tile has an entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of label correspondences over all tiles and directions.
    pub fn mapping_count(&self) -> usize {
        self.entries
            .values()
            .map(|e| e.horizontal.len() + e.vertical.len())
            .sum()
    }

    /// Entries in tile index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &TileRemap)> {
        self.entries.iter().map(|(index, entry)| (*index, entry))
    }
}

/// Scan the overlap strip shared by `first` (left/upper) and `second`
/// (right/lower) and map labels of `second` to labels of `first`.
///
/// The strip is scanned in raster order; the first position where both
/// labels are nonzero decides a label's target. An overlap of zero yields
/// an empty map.
pub fn border_remapping(first: &Plane<u32>, second: &Plane<u32>, overlap: u32, direction: Direction) -> LabelMap {
    let mut map = LabelMap::new();
    let (width, height) = first.dimensions();

    let (rows, cols, origin_x, origin_y) = match direction {
        Direction::Horizontal => {
            let overlap = overlap.min(width).min(second.width());
            (height.min(second.height()), overlap, width - overlap, 0)
        }
        Direction::Vertical => {
            let overlap = overlap.min(height).min(second.height());
            (overlap, width.min(second.width()), 0, height - overlap)
        }
    };

    for y in 0..rows {
        for x in 0..cols {
            let label = second.get_pixel(x, y).0[0];
            if label == 0 || map.contains_key(&label) {
                continue;
            }
            let target = first.get_pixel(origin_x + x, origin_y + y).0[0];
            if target != 0 {
                map.insert(label, target);
            }
        }
    }

    map
}

/// One border comparison between two adjacent tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderTask {
    /// Left or upper tile index.
    pub first: usize,
    /// Right or lower tile index; owns the resulting mapping.
    pub second: usize,
    /// Border orientation.
    pub direction: Direction,
}

impl BorderTask {
    /// Read page 0 of both tiles and compute their mapping.
    pub fn run(&self, source: &dyn TileSource, layout: &GridLayout) -> StitchResult<LabelMap> {
        let read = |index: usize| -> StitchResult<Plane<u32>> {
            let plane = source.read_plane(index, 0)?;
            if plane.dimensions() != layout.tile_shape() {
                return Err(StitchError::invalid_grid(format!(
                    "tile {} does not match the grid tile shape",
                    source.describe(index)
                )));
            }
            plane.into_plane::<u32>()
        };

        let mapped = read(self.first)
            .and_then(|first| read(self.second).map(|second| (first, second)))
            .map(|(first, second)| border_remapping(&first, &second, layout.overlap(), self.direction));

        mapped.map_err(|e| StitchError::RemapTaskFailure {
            first: self.first,
            second: self.second,
            direction: self.direction,
            error: Box::new(e),
        })
    }
}

/// Resolves the remap table of a grid.
#[derive(Debug, Clone)]
pub struct RemapResolver<'a> {
    layout: &'a GridLayout,
    parallel: bool,
}

impl<'a> RemapResolver<'a> {
    /// Create a resolver that runs tasks in parallel.
    pub fn new(layout: &'a GridLayout) -> Self {
        Self {
            layout,
            parallel: true,
        }
    }

    /// Enable or disable parallel task execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// All border tasks: horizontal pairs first, then vertical pairs.
    pub fn tasks(&self) -> Vec<BorderTask> {
        let horizontal = self.layout.horizontal_pairs().into_iter().map(|(first, second)| BorderTask {
            first,
            second,
            direction: Direction::Horizontal,
        });
        let vertical = self.layout.vertical_pairs().into_iter().map(|(first, second)| BorderTask {
            first,
            second,
            direction: Direction::Vertical,
        });
        horizontal.chain(vertical).collect()
    }

    /// Run every task and merge the results.
    ///
    /// The first failing task aborts the resolve; no partial table is returned.
    pub fn resolve(&self, source: &dyn TileSource) -> StitchResult<RemapTable> {
        let tasks = self.tasks();
        log::info!(
            "resolving {} border remap task(s) on a {}x{} grid",
            tasks.len(),
            self.layout.x_nblocks(),
            self.layout.y_nblocks()
        );

        let run = |task: &BorderTask| -> StitchResult<(BorderTask, LabelMap)> {
            let map = task.run(source, self.layout)?;
            log::debug!(
                "{} border {} -> {}: {} mapping(s)",
                task.direction,
                task.first,
                task.second,
                map.len()
            );
            Ok((*task, map))
        };

        let results = if self.parallel {
            tasks.par_iter().map(run).collect::<StitchResult<Vec<_>>>()?
        } else {
            tasks.iter().map(run).collect::<StitchResult<Vec<_>>>()?
        };

        Ok(Self::merge(results))
    }

    /// Merge task results by the index of the tile that owns each mapping.
    pub fn merge(results: impl IntoIterator<Item = (BorderTask, LabelMap)>) -> RemapTable {
        let mut table = RemapTable::new();
        for (task, map) in results {
            table.insert(task.second, task.direction, map);
        }
        table
    }
}

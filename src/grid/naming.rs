//! Tile discovery from file names.
//!
//! Tile names carry their grid position as letter-prefix/number pairs, e.g.
//! `R1_X002_Y003.tif`: `X` is the column, `Y` the row and `R` the
//! acquisition cycle. Numbering may start at 0 or 1; the smallest value seen
//! becomes the first row/column.

use crate::core::error::{StitchError, StitchResult};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Column key in tile names.
pub const COLUMN_KEY: &str = "X";
/// Row key in tile names.
pub const ROW_KEY: &str = "Y";
/// Acquisition cycle key in tile names.
pub const CYCLE_KEY: &str = "R";

const TILE_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([A-Za-z]+)(\d+)").expect("valid tile name pattern"))
}

/// A tile file and the numeric fields parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileName {
    /// Path of the tile file.
    pub path: PathBuf,
    /// `key -> value` for every letter/number pair in the file stem.
    pub fields: BTreeMap<String, u32>,
}

impl TileName {
    /// Parse the fields of a tile path. The first occurrence of a key wins.
    pub fn parse(path: impl AsRef<Path>) -> StitchResult<Self> {
        let path = path.as_ref().to_path_buf();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| StitchError::TileName {
                name: path.display().to_string(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;

        let mut fields = BTreeMap::new();
        for captures in field_pattern().captures_iter(stem) {
            let value = captures[2].parse::<u32>().map_err(|e| StitchError::TileName {
                name: stem.to_string(),
                reason: format!("field '{}' is not a number: {}", &captures[1], e),
            })?;
            fields.entry(captures[1].to_string()).or_insert(value);
        }

        Ok(Self { path, fields })
    }

    /// Value of `key`, if the name has it.
    pub fn get(&self, key: &str) -> Option<u32> {
        self.fields.get(key).copied()
    }

    fn require(&self, key: &str) -> StitchResult<u32> {
        self.get(key).ok_or_else(|| StitchError::TileName {
            name: self.path.display().to_string(),
            reason: format!("missing '{}' field", key),
        })
    }
}

/// Tiles of one acquisition cycle, sorted row-major.
#[derive(Debug, Clone)]
pub struct TileSet {
    tiles: Vec<TileName>,
    x_nblocks: usize,
    y_nblocks: usize,
}

impl TileSet {
    /// Collect the `.tif`/`.tiff` files of `directory` into a grid.
    pub fn from_directory(directory: impl AsRef<Path>, cycle: Option<u32>) -> StitchResult<Self> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(StitchError::invalid_grid(format!(
                "{} is not a directory",
                directory.display()
            )));
        }

        let root = directory.to_str().ok_or_else(|| {
            StitchError::invalid_grid(format!("{} is not valid UTF-8", directory.display()))
        })?;
        let pattern = format!("{}/*", glob::Pattern::escape(root));
        let entries = glob::glob(&pattern)
            .map_err(|e| StitchError::invalid_grid(format!("invalid tile pattern: {}", e)))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StitchError::Io(e.into_error()))?;
            if !path.is_file() || !has_tile_extension(&path) {
                continue;
            }
            names.push(TileName::parse(&path)?);
        }

        log::debug!("found {} tile files in {}", names.len(), directory.display());
        Self::from_names(names, cycle)
    }

    /// Arrange parsed names into a dense grid.
    pub fn from_names(names: Vec<TileName>, cycle: Option<u32>) -> StitchResult<Self> {
        let cycles: BTreeSet<Option<u32>> = names.iter().map(|n| n.get(CYCLE_KEY)).collect();
        let names: Vec<TileName> = match cycle {
            Some(wanted) => names
                .into_iter()
                .filter(|n| n.get(CYCLE_KEY) == Some(wanted))
                .collect(),
            None if cycles.len() > 1 => {
                return Err(StitchError::invalid_grid(format!(
                    "tiles from {} acquisition cycles found; select one",
                    cycles.len()
                )));
            }
            None => names,
        };

        if names.is_empty() {
            return Err(StitchError::invalid_grid("no tiles found"));
        }

        let mut placed = Vec::with_capacity(names.len());
        for name in names {
            let row = name.require(ROW_KEY)?;
            let col = name.require(COLUMN_KEY)?;
            placed.push((row, col, name));
        }

        let min_row = placed.iter().map(|(r, _, _)| *r).min().unwrap_or(0);
        let min_col = placed.iter().map(|(_, c, _)| *c).min().unwrap_or(0);
        let max_row = placed.iter().map(|(r, _, _)| *r).max().unwrap_or(0);
        let max_col = placed.iter().map(|(_, c, _)| *c).max().unwrap_or(0);
        let y_nblocks = (max_row - min_row) as usize + 1;
        let x_nblocks = (max_col - min_col) as usize + 1;

        placed.sort_by_key(|(row, col, _)| (*row, *col));

        for (i, (row, col, name)) in placed.iter().enumerate() {
            let expected = (i / x_nblocks, i % x_nblocks);
            let actual = ((row - min_row) as usize, (col - min_col) as usize);
            if actual != expected {
                return Err(StitchError::invalid_grid(format!(
                    "expected tile at row {}, column {} but found {} at row {}, column {}",
                    expected.0,
                    expected.1,
                    name.path.display(),
                    actual.0,
                    actual.1
                )));
            }
        }

        if placed.len() != x_nblocks * y_nblocks {
            return Err(StitchError::invalid_grid(format!(
                "{} tiles cannot fill a {}x{} grid",
                placed.len(),
                x_nblocks,
                y_nblocks
            )));
        }

        Ok(Self {
            tiles: placed.into_iter().map(|(_, _, name)| name).collect(),
            x_nblocks,
            y_nblocks,
        })
    }

    /// Number of tile columns.
    pub fn x_nblocks(&self) -> usize {
        self.x_nblocks
    }

    /// Number of tile rows.
    pub fn y_nblocks(&self) -> usize {
        self.y_nblocks
    }

    /// Tiles in row-major order.
    pub fn tiles(&self) -> &[TileName] {
        &self.tiles
    }

    /// Tile paths in row-major order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.tiles.iter().map(|t| t.path.clone()).collect()
    }
}

fn has_tile_extension(path: &Path) -> bool {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    TILE_EXTENSIONS.contains(&extension.as_str())
}

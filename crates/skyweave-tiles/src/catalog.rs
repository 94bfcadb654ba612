//! Catalog tiles: delimited rows streamed into a spreadsheet-style consumer.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::key::TileKey;

/// One parsed catalog record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogRow {
    pub fields: Vec<String>,
}

impl CatalogRow {
    pub fn get(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// Parse a catalog tile body.
///
/// Lines starting with `#` are comments. The first other line is the column
/// header. Blank rows and rows whose field count differs from the header's
/// are dropped without affecting the rest.
pub fn parse_catalog_rows(text: &str, delimiter: char) -> Vec<CatalogRow> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.starts_with('#'));

    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns = header.split(delimiter).count();

    lines
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split(delimiter).map(str::to_string).collect::<Vec<_>>())
        .filter(|fields| fields.len() == columns)
        .map(|fields| CatalogRow { fields })
        .collect()
}

/// Receives catalog rows as tiles enter and leave the view.
///
/// Rows stay owned by their tile; the sink only holds shared references.
pub trait CatalogSink {
    fn add_tile_rows(&mut self, key: TileKey, rows: &Arc<[CatalogRow]>);
    fn remove_tile_rows(&mut self, key: TileKey, rows: &Arc<[CatalogRow]>);
}

/// The set of rows from tiles currently in view.
#[derive(Debug, Default)]
pub struct VisibleRows {
    tiles: FxHashMap<TileKey, Arc<[CatalogRow]>>,
    version: u64,
}

impl VisibleRows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped whenever the visible set changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn row_count(&self) -> usize {
        self.tiles.values().map(|rows| rows.len()).sum()
    }

    pub fn contains_tile(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &CatalogRow> {
        self.tiles.values().flat_map(|rows| rows.iter())
    }
}

impl CatalogSink for VisibleRows {
    fn add_tile_rows(&mut self, key: TileKey, rows: &Arc<[CatalogRow]>) {
        if self.tiles.insert(key, Arc::clone(rows)).is_none() {
            self.version += 1;
        }
    }

    fn remove_tile_rows(&mut self, key: TileKey, _rows: &Arc<[CatalogRow]>) {
        if self.tiles.remove(&key).is_some() {
            self.version += 1;
        }
    }
}

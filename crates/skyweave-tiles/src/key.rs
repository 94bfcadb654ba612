//! Tile identity: content keys and arena handles.

use std::fmt;

use crate::dataset::DatasetId;

/// Position of a tile within its dataset's quadtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TileCoord {
    /// HEALPix nested pixel index at the tile's level.
    Healpix { ipix: u64 },
    /// Column/row of a tangent-plane grid at the tile's level.
    Grid { x: u32, y: u32 },
}

/// Identifies the data a tile holds. One canonical tile exists per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub dataset: DatasetId,
    pub level: u32,
    pub coord: TileCoord,
}

impl TileKey {
    pub fn new(dataset: DatasetId, level: u32, coord: TileCoord) -> Self {
        Self {
            dataset,
            level,
            coord,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.coord {
            TileCoord::Healpix { ipix } => {
                write!(f, "{}/L{}/npix{}", self.dataset.0, self.level, ipix)
            }
            TileCoord::Grid { x, y } => {
                write!(f, "{}/L{}/{}_{}", self.dataset.0, self.level, x, y)
            }
        }
    }
}

/// Handle to a tile slot in the cache arena.
///
/// The generation changes whenever a slot is reused, so a handle to a purged
/// tile resolves to nothing instead of to whatever now occupies the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Child slot for quadrant `(x1, y1)`.
#[inline]
pub fn child_slot(x1: u32, y1: u32) -> usize {
    (y1 * 2 + x1) as usize
}

/// Quadrant `(x1, y1)` for a child slot.
#[inline]
pub fn slot_quadrant(slot: usize) -> (u32, u32) {
    ((slot % 2) as u32, (slot / 2) as u32)
}

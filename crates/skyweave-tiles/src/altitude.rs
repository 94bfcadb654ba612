//! Point containment and surface altitude queries.

use skyweave_math::{geo_to_vec, uv_from_inner_point};

use crate::cache::TileCache;
use crate::error::TileError;
use crate::key::TileId;
use crate::tile::Tile;

impl TileCache {
    /// Whether `(lat, lng)`, in degrees, falls inside the tile.
    pub fn is_point_in_tile(&self, id: TileId, lat: f64, lng: f64) -> Result<bool, TileError> {
        Ok(self.get(id)?.is_point_in_tile(lat, lng))
    }

    /// Surface altitude at `(lat, lng)`.
    ///
    /// Descends into the child containing the point, no deeper than the
    /// deepest level drawn last frame, and uses the first non-zero answer.
    /// Otherwise samples this tile's elevation grid. A tile without a grid
    /// answers with the flat average of its nearest ancestor's grid. The
    /// result is in meters when `meters` is set, else in units of the
    /// dataset's `dem_scale_factor`.
    pub fn surface_point_altitude(
        &self,
        id: TileId,
        lat: f64,
        lng: f64,
        meters: bool,
    ) -> Result<f64, TileError> {
        let tile = self.get(id)?;
        let mut raw = self.altitude_below(tile, lat, lng);
        if raw == 0.0 && tile.elevation.is_none() {
            raw = self.ancestor_average(tile);
        }
        Ok(if meters {
            raw
        } else {
            raw / tile.dataset.dem_scale_factor
        })
    }

    fn altitude_below(&self, tile: &Tile, lat: f64, lng: f64) -> f64 {
        if tile.level() < self.last_deepest_level {
            let containing = tile
                .children
                .iter()
                .flatten()
                .filter_map(|&child| self.tile(child))
                .find(|child| child.is_point_in_tile(lat, lng));
            if let Some(child) = containing {
                let altitude = self.altitude_below(child, lat, lng);
                if altitude != 0.0 {
                    return altitude;
                }
            }
        }
        grid_altitude(tile, lat, lng)
    }

    fn ancestor_average(&self, tile: &Tile) -> f64 {
        let mut parent = tile.parent;
        while let Some(ancestor) = parent.and_then(|p| self.tile(p)) {
            if let Some(grid) = &ancestor.elevation {
                return grid.average();
            }
            parent = ancestor.parent;
        }
        0.0
    }
}

fn grid_altitude(tile: &Tile, lat: f64, lng: f64) -> f64 {
    let Some(grid) = &tile.elevation else {
        return 0.0;
    };
    let c = &tile.corners;
    let uv = uv_from_inner_point(
        c.top_left,
        c.top_right,
        c.bottom_left,
        c.bottom_right,
        geo_to_vec(lat, lng),
    );
    grid.interpolate(uv.x, uv.y)
}

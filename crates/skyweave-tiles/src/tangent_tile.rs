//! Tangent-plane (gnomonic) tessellation for rectangular mosaics.

use glam::DVec3;
use skyweave_math::BoundingSphere;

use crate::dataset::Dataset;
use crate::key::TileCoord;
use crate::tessellation::{Corners, Tessellation, TileMesh, TileVertex, expand_template};

/// Latitude/longitude extent of a tangent tile, degrees.
///
/// `lat_min` is the latitude of the top edge; with top-down numbering it is
/// the larger of the two.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLngEdges {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl LatLngEdges {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.lat_min + self.lat_max) / 2.0,
            (self.lng_min + self.lng_max) / 2.0,
        )
    }
}

/// Fixed 3x3 vertex layout: edge midpoints, centre and corners.
const BOTTOM_CENTER: usize = 0;
const BOTTOM_LEFT: usize = 1;
const BOTTOM_RIGHT: usize = 2;
const CENTER: usize = 3;
const LEFT_CENTER: usize = 4;
const RIGHT_CENTER: usize = 5;
const TOP_CENTER: usize = 6;
const TOP_LEFT: usize = 7;
const TOP_RIGHT: usize = 8;

const PART_INDICES: [[usize; 6]; 4] = [
    [TOP_LEFT, LEFT_CENTER, TOP_CENTER, LEFT_CENTER, CENTER, TOP_CENTER],
    [TOP_CENTER, RIGHT_CENTER, TOP_RIGHT, TOP_CENTER, CENTER, RIGHT_CENTER],
    [LEFT_CENTER, BOTTOM_CENTER, CENTER, LEFT_CENTER, BOTTOM_LEFT, BOTTOM_CENTER],
    [CENTER, BOTTOM_RIGHT, RIGHT_CENTER, CENTER, BOTTOM_CENTER, BOTTOM_RIGHT],
];

/// One tile of a tangent-plane pyramid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TangentShape {
    level: u32,
    x: u32,
    y: u32,
}

impl TangentShape {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    pub fn xy(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Angular size of one tile at this level, degrees.
    pub fn tile_degrees(&self, dataset: &Dataset) -> f64 {
        dataset.base_degrees / (1u64 << self.level) as f64
    }

    pub fn edges(&self, dataset: &Dataset) -> LatLngEdges {
        let tile_deg = self.tile_degrees(dataset);
        let half_base = dataset.base_degrees / 2.0;
        let (x, y) = (self.x as f64, self.y as f64);
        let (lat_min, lat_max) = if dataset.bottoms_up {
            (half_base + (y + 1.0) * tile_deg, half_base + y * tile_deg)
        } else {
            (half_base - y * tile_deg, half_base - (y + 1.0) * tile_deg)
        };
        let lng_origin = dataset.base_degrees / dataset.width_factor;
        LatLngEdges {
            lat_min: lat_min + dataset.offset_y,
            lat_max: lat_max + dataset.offset_y,
            lng_min: x * tile_deg - lng_origin + dataset.offset_x,
            lng_max: (x + 1.0) * tile_deg - lng_origin + dataset.offset_x,
        }
    }

    /// Bing-style quadkey: one base-4 digit per level, most significant first.
    pub fn quadkey(&self) -> String {
        (1..=self.level)
            .rev()
            .map(|bit| {
                let mask = 1 << (bit - 1);
                let digit = u32::from(self.x & mask != 0) + 2 * u32::from(self.y & mask != 0);
                char::from(b'0' + digit as u8)
            })
            .collect()
    }
}

/// Gnomonic projection of `(lat, lng)` on the dataset's tangent plane.
pub fn project(dataset: &Dataset, lat: f64, lng: f64) -> DVec3 {
    let half_base = dataset.base_degrees / 2.0;
    let factor = half_base.to_radians().tan();
    dataset.orientation
        * DVec3::new(1.0, lng / half_base * factor, lat / half_base * factor)
}

impl Tessellation for TangentShape {
    fn level(&self) -> u32 {
        self.level
    }

    fn coord(&self) -> TileCoord {
        TileCoord::Grid {
            x: self.x,
            y: self.y,
        }
    }

    fn address(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    fn compute_boundaries(&self, dataset: &Dataset) -> Corners {
        let e = self.edges(dataset);
        Corners {
            top_left: project(dataset, e.lat_min, e.lng_min),
            top_right: project(dataset, e.lat_min, e.lng_max),
            bottom_left: project(dataset, e.lat_max, e.lng_min),
            bottom_right: project(dataset, e.lat_max, e.lng_max),
        }
    }

    fn derive_url(&self, _dataset: &Dataset, template: &str) -> String {
        expand_template(
            template,
            &[
                ("level", &self.level.to_string()),
                ("x", &self.x.to_string()),
                ("y", &self.y.to_string()),
                ("quadkey", &self.quadkey()),
            ],
        )
    }

    fn sample_vertices(&self, dataset: &Dataset) -> TileMesh {
        let origin = project(dataset, 0.0, 0.0);
        let c = self.compute_boundaries(dataset);
        let mid = |a: DVec3, b: DVec3| (a + b) * 0.5;

        let mut grid = [(DVec3::ZERO, 0.0, 0.0); 9];
        grid[BOTTOM_CENTER] = (mid(c.bottom_left, c.bottom_right), 0.5, 1.0);
        grid[BOTTOM_LEFT] = (c.bottom_left, 0.0, 1.0);
        grid[BOTTOM_RIGHT] = (c.bottom_right, 1.0, 1.0);
        grid[CENTER] = (mid(c.top_left, c.bottom_right), 0.5, 0.5);
        grid[LEFT_CENTER] = (mid(c.top_left, c.bottom_left), 0.0, 0.5);
        grid[RIGHT_CENTER] = (mid(c.top_right, c.bottom_right), 1.0, 0.5);
        grid[TOP_CENTER] = (mid(c.top_left, c.top_right), 0.5, 0.0);
        grid[TOP_LEFT] = (c.top_left, 0.0, 0.0);
        grid[TOP_RIGHT] = (c.top_right, 1.0, 0.0);

        TileMesh {
            origin,
            vertices: grid
                .iter()
                .map(|&(p, u, v)| TileVertex::new(p, origin, u, v))
                .collect(),
            parts: PART_INDICES.map(|part| part.iter().map(|&i| i as u16).collect()),
        }
    }

    fn bounding_sphere(&self, dataset: &Dataset) -> BoundingSphere {
        let e = self.edges(dataset);
        let (lat, lng) = e.center();
        let center = project(dataset, lat, lng);
        let radius = (project(dataset, e.lat_min, e.lng_min) - center).length();
        BoundingSphere::new(center, radius)
    }

    fn is_big_enough(&self, dataset: &Dataset, fov_scale: f64) -> bool {
        if self.level <= 1 {
            return true;
        }
        let arc = self.tile_degrees(dataset) * 3600.0 / dataset.tile_pixels.max(1) as f64;
        fov_scale < arc
    }

    fn child(&self, x1: u32, y1: u32) -> Box<dyn Tessellation> {
        Box::new(Self::new(self.level + 1, self.x * 2 + x1, self.y * 2 + y1))
    }
}

#[cfg(test)]
mod tests {
    use skyweave_math::geo_to_vec;

    use super::*;
    use crate::dataset::{DatasetId, orientation_matrix};

    fn mosaic() -> Dataset {
        Dataset::tangent(DatasetId(1), "mosaic", 36.0, "L{level}/{y}/{x}.png")
    }

    #[test]
    fn test_top_down_root_edges_and_origin() {
        let mut ds = mosaic();
        ds.orientation = orientation_matrix(20.0, 75.0, 10.0);
        let root = TangentShape::new(0, 0, 0);
        let e = root.edges(&ds);
        assert!(e.lat_min > e.lat_max);
        assert_eq!((e.lat_min, e.lat_max), (18.0, -18.0));
        assert_eq!((e.lng_min, e.lng_max), (-18.0, 18.0));

        let origin = project(&ds, 0.0, 0.0);
        assert!((origin - ds.orientation * DVec3::X).length() < 1e-15);
        assert!((origin - geo_to_vec(20.0, 75.0)).length() < 1e-12);
    }

    #[test]
    fn test_corners_follow_edges() {
        let ds = mosaic();
        let c = TangentShape::new(0, 0, 0).compute_boundaries(&ds);
        let t = 18f64.to_radians().tan();
        assert!((c.top_left - DVec3::new(1.0, -t, t)).length() < 1e-12);
        assert!((c.bottom_right - DVec3::new(1.0, t, -t)).length() < 1e-12);
    }

    #[test]
    fn test_bottoms_up_edges() {
        let mut ds = mosaic();
        ds.bottoms_up = true;
        let e = TangentShape::new(1, 0, 0).edges(&ds);
        assert_eq!((e.lat_min, e.lat_max), (36.0, 18.0));
    }

    #[test]
    fn test_fixed_nine_vertex_mesh() {
        let ds = mosaic();
        for shape in [TangentShape::new(0, 0, 0), TangentShape::new(3, 5, 2)] {
            let mesh = shape.sample_vertices(&ds);
            assert_eq!(mesh.vertices.len(), 9);
            for part in 0..4 {
                assert_eq!(mesh.triangle_count(part), 2);
            }
            assert_eq!(mesh.vertices[TOP_LEFT].uv, [0.0, 0.0]);
            assert_eq!(mesh.vertices[BOTTOM_RIGHT].uv, [1.0, 1.0]);
        }
    }

    #[test]
    fn test_mesh_is_relative_to_origin() {
        let ds = mosaic();
        let mesh = TangentShape::new(0, 0, 0).sample_vertices(&ds);
        assert_eq!(mesh.origin, project(&ds, 0.0, 0.0));
        // The root's centre vertex sits on the origin.
        assert_eq!(mesh.vertices[CENTER].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bounding_sphere_reaches_all_corners() {
        let ds = mosaic();
        let shape = TangentShape::new(2, 1, 3);
        let s = shape.bounding_sphere(&ds);
        let c = shape.compute_boundaries(&ds);
        for p in [c.top_left, c.top_right, c.bottom_left, c.bottom_right] {
            assert!(s.contains(p));
        }
    }

    #[test]
    fn test_children_and_quadkey() {
        let shape = TangentShape::new(1, 1, 0);
        let child = shape.child(1, 1);
        assert_eq!(child.level(), 2);
        assert_eq!(child.coord(), TileCoord::Grid { x: 3, y: 1 });
        assert_eq!(TangentShape::new(2, 3, 1).quadkey(), "13");
        assert_eq!(TangentShape::new(0, 0, 0).quadkey(), "");
    }

    #[test]
    fn test_url_placeholders() {
        let ds = mosaic();
        let url = TangentShape::new(2, 3, 1).derive_url(&ds, "t/{level}/{quadkey}/{x}_{y}");
        assert_eq!(url, "t/2/13/3_1");
        assert_eq!(
            TangentShape::new(1, 0, 1).derive_url(&ds, &ds.url_template),
            "L1/1/0.png"
        );
    }

    #[test]
    fn test_point_in_children() {
        let ds = mosaic();
        let root = TangentShape::new(0, 0, 0);
        // Upper-right quadrant: positive lat, positive lng.
        let p = geo_to_vec(9.0, 9.0);
        for y1 in 0..2 {
            for x1 in 0..2 {
                let child = root.child(x1, y1);
                let c = child.compute_boundaries(&ds);
                assert_eq!(child.contains_point(&ds, &c, p), (x1, y1) == (1, 0));
            }
        }
    }

    #[test]
    fn test_shallow_levels_always_big_enough() {
        let ds = mosaic();
        assert!(TangentShape::new(1, 0, 0).is_big_enough(&ds, 1e9));
        // Level 2: 9 degrees over 256 pixels is 126.5625 arcsec per pixel.
        let shape = TangentShape::new(2, 0, 0);
        assert!(shape.is_big_enough(&ds, 100.0));
        assert!(!shape.is_big_enough(&ds, 130.0));
    }
}

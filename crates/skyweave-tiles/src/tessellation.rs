//! The tessellation strategy seam shared by HEALPix and tangent-plane tiles.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::DVec3;
use skyweave_math::{BoundingSphere, is_left_of_half_space};

use crate::dataset::Dataset;
use crate::key::TileCoord;

/// Per-vertex data uploaded for a tile: position relative to the mesh origin
/// and texture coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TileVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

static_assertions::assert_eq_size!(TileVertex, [u8; 20]);

impl TileVertex {
    pub fn new(position: DVec3, origin: DVec3, u: f64, v: f64) -> Self {
        Self {
            position: (position - origin).as_vec3().to_array(),
            uv: [u as f32, v as f32],
        }
    }
}

/// CPU-side geometry for one tile, split into four quadrant parts so each
/// quadrant can be drawn independently of its siblings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileMesh {
    /// World-space offset added back to every vertex position.
    pub origin: DVec3,
    pub vertices: Vec<TileVertex>,
    /// Triangle lists, indexed by child slot.
    pub parts: [Vec<u16>; 4],
}

impl TileMesh {
    pub fn triangle_count(&self, part: usize) -> usize {
        self.parts.get(part).map_or(0, |p| p.len() / 3)
    }

    /// World-space positions of every vertex.
    pub fn world_positions(&self) -> impl Iterator<Item = DVec3> + '_ {
        self.vertices
            .iter()
            .map(|v| glam::Vec3::from_array(v.position).as_dvec3() + self.origin)
    }
}

/// The four corners of a tile in render space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Corners {
    pub top_left: DVec3,
    pub top_right: DVec3,
    pub bottom_left: DVec3,
    pub bottom_right: DVec3,
}

impl Corners {
    /// Normalized mean of the corners.
    pub fn center(&self) -> DVec3 {
        (self.top_left + self.top_right + self.bottom_left + self.bottom_right).normalize_or_zero()
    }

    /// Great-circle quadrilateral containment.
    ///
    /// Each edge plane is oriented so the tile centre lies on its positive
    /// side, which makes the test independent of corner winding.
    pub fn contains(&self, point: DVec3) -> bool {
        let center = self.center();
        let edges = [
            (self.top_left, self.top_right),
            (self.top_right, self.bottom_right),
            (self.bottom_right, self.bottom_left),
            (self.bottom_left, self.top_left),
        ];
        edges.iter().all(|&(a, b)| {
            let center_left = is_left_of_half_space(a, b, center);
            is_left_of_half_space(a, b, point) == center_left
        })
    }
}

/// Geometry strategy for one tile.
///
/// A strategy knows its own place in the quadtree and how to sample, name,
/// and subdivide itself. State shared by every tile (flags, buffers,
/// children) lives on [`crate::Tile`].
pub trait Tessellation: fmt::Debug + Send + Sync {
    fn level(&self) -> u32;

    fn coord(&self) -> TileCoord;

    /// Column and row of the tile within its level, as passed to
    /// `TileCache::get_tile`.
    fn address(&self) -> (u32, u32);

    /// Corner vectors of the tile.
    fn compute_boundaries(&self, dataset: &Dataset) -> Corners;

    /// Expand `template` with this tile's placeholders.
    fn derive_url(&self, dataset: &Dataset, template: &str) -> String;

    /// Vertex grid and per-quadrant triangle lists.
    fn sample_vertices(&self, dataset: &Dataset) -> TileMesh;

    fn bounding_sphere(&self, dataset: &Dataset) -> BoundingSphere;

    /// True when this tile is too coarse for `fov_scale` and its children
    /// should be drawn instead.
    fn is_big_enough(&self, dataset: &Dataset, fov_scale: f64) -> bool;

    /// True when `point` (a unit vector in render space) falls in the tile.
    fn contains_point(&self, _dataset: &Dataset, corners: &Corners, point: DVec3) -> bool {
        corners.contains(point)
    }

    /// Strategy for child quadrant `(x1, y1)`, each in `0..2`.
    fn child(&self, x1: u32, y1: u32) -> Box<dyn Tessellation>;
}

/// Replace every `{name}` placeholder in `template`.
pub(crate) fn expand_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in values {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

//! A node of the tile quadtree.

use std::sync::Arc;

use glam::DVec3;
use skyweave_math::{BoundingSphere, Frustum, geo_to_vec};

use crate::catalog::CatalogRow;
use crate::dataset::Dataset;
use crate::device::{MeshHandle, TextureHandle};
use crate::key::{TileId, TileKey};
use crate::payload::{ElevationGrid, TextureData};
use crate::tessellation::{Corners, Tessellation};

/// Data acquisition state of a tile.
///
/// `Unrequested -> Downloading -> Ready | Errored`. Nothing moves back to
/// `Downloading` short of removing the tile from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unrequested,
    Downloading,
    Ready,
    Errored,
}

/// Whether a quadrant is drawn from this tile's own geometry.
///
/// `target` is decided during traversal; `current` is what was last drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct QuadrantVisibility {
    pub target: bool,
    pub current: bool,
}

/// GPU resources of a tile that has been drawn at least once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Geometry {
    pub mesh: MeshHandle,
    pub origin: DVec3,
    pub triangles: [usize; 4],
}

/// One node of a dataset's quadtree.
///
/// Tiles live in the [`crate::TileCache`] arena; parent and child links are
/// [`TileId`] handles into it.
#[derive(Debug)]
pub struct Tile {
    pub(crate) key: TileKey,
    pub(crate) dataset: Arc<Dataset>,
    pub(crate) shape: Box<dyn Tessellation>,
    pub(crate) parent: Option<TileId>,
    pub(crate) children: [Option<TileId>; 4],
    pub(crate) corners: Corners,
    pub(crate) bounds: BoundingSphere,
    pub(crate) quadrants: [QuadrantVisibility; 4],

    pub(crate) state: LoadState,
    pub(crate) queued: bool,
    /// Frame generation of the most recent enqueue.
    pub(crate) requested_generation: u64,
    pub(crate) payload_ready: bool,
    pub(crate) elevation_ready: bool,
    pub(crate) outstanding_fetches: u8,
    pub(crate) fetch_failed: bool,

    pub(crate) geometry: Option<Geometry>,
    pub(crate) texture: Option<TextureHandle>,
    /// Decoded pixels, kept so geometry can be rebuilt after a clean-up.
    pub(crate) image: Option<Arc<TextureData>>,
    pub(crate) elevation: Option<ElevationGrid>,
    pub(crate) rows: Arc<[CatalogRow]>,
    pub(crate) rows_visible: bool,

    pub(crate) rendered_generation: u64,
    pub(crate) rendered_at_or_below_generation: u64,
}

impl Tile {
    /// Build a tile and compute its corners and bounding sphere.
    pub(crate) fn new(
        key: TileKey,
        dataset: Arc<Dataset>,
        shape: Box<dyn Tessellation>,
        parent: Option<TileId>,
        generation: u64,
    ) -> Self {
        let corners = shape.compute_boundaries(&dataset);
        let bounds = shape.bounding_sphere(&dataset);
        Self {
            key,
            dataset,
            shape,
            parent,
            children: [None; 4],
            corners,
            bounds,
            quadrants: [QuadrantVisibility::default(); 4],
            state: LoadState::Unrequested,
            queued: false,
            requested_generation: 0,
            payload_ready: false,
            elevation_ready: false,
            outstanding_fetches: 0,
            fetch_failed: false,
            geometry: None,
            texture: None,
            image: None,
            elevation: None,
            rows: Arc::from(Vec::new()),
            rows_visible: false,
            rendered_generation: 0,
            rendered_at_or_below_generation: generation,
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn level(&self) -> u32 {
        self.key.level
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn shape(&self) -> &dyn Tessellation {
        self.shape.as_ref()
    }

    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    pub fn children(&self) -> &[Option<TileId>; 4] {
        &self.children
    }

    pub fn corners(&self) -> &Corners {
        &self.corners
    }

    pub fn bounds(&self) -> &BoundingSphere {
        &self.bounds
    }

    pub fn quadrant(&self, slot: usize) -> QuadrantVisibility {
        self.quadrants[slot]
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    pub fn is_errored(&self) -> bool {
        self.state == LoadState::Errored
    }

    pub fn is_downloading(&self) -> bool {
        self.state == LoadState::Downloading
    }

    /// Queued or downloading.
    pub fn is_pending(&self) -> bool {
        self.queued || self.is_downloading()
    }

    pub fn mesh(&self) -> Option<MeshHandle> {
        self.geometry.map(|g| g.mesh)
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn elevation(&self) -> Option<&ElevationGrid> {
        self.elevation.as_ref()
    }

    pub fn rows(&self) -> &Arc<[CatalogRow]> {
        &self.rows
    }

    /// True while this tile's rows are mirrored into a catalog sink.
    pub fn rows_visible(&self) -> bool {
        self.rows_visible
    }

    pub fn rendered_generation(&self) -> u64 {
        self.rendered_generation
    }

    pub fn rendered_at_or_below_generation(&self) -> u64 {
        self.rendered_at_or_below_generation
    }

    /// Latest generation in which traversal visited this tile or drew
    /// something at or below it.
    pub(crate) fn last_used_generation(&self) -> u64 {
        self.rendered_generation.max(self.rendered_at_or_below_generation)
    }

    /// Triangles in the quadrant drawn for child slot `part`.
    pub fn triangle_count(&self, part: usize) -> usize {
        self.geometry.map_or(0, |g| g.triangles[part])
    }

    /// Conservative visibility test of the bounding sphere.
    pub fn is_in_frustum(&self, frustum: &Frustum) -> bool {
        frustum.intersects_sphere(&self.bounds)
    }

    /// True when this tile is too coarse at `fov_scale` and must subdivide.
    pub fn is_big_enough(&self, fov_scale: f64) -> bool {
        self.shape.is_big_enough(&self.dataset, fov_scale)
    }

    /// Whether `(lat, lng)`, in degrees, falls in this tile.
    pub fn is_point_in_tile(&self, lat: f64, lng: f64) -> bool {
        let point = geo_to_vec(lat, lng);
        self.shape.contains_point(&self.dataset, &self.corners, point)
    }

    /// URL of the main payload.
    pub fn url(&self) -> String {
        self.shape.derive_url(&self.dataset, &self.dataset.url_template)
    }

    /// URL of the elevation payload, if the dataset has one.
    pub fn elevation_url(&self) -> Option<String> {
        self.dataset
            .elevation_template
            .as_deref()
            .map(|template| self.shape.derive_url(&self.dataset, template))
    }

    /// Payload and (if the dataset has one) elevation are both in.
    pub(crate) fn data_complete(&self) -> bool {
        self.payload_ready && (self.elevation_ready || !self.dataset.has_elevation())
    }
}

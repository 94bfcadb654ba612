//! Dataset descriptors: everything a tile tree needs to know about its imagery.

use std::sync::Arc;

use glam::DMat3;
use skyweave_config::{DatasetConfig, MAX_TILE_LEVEL, Projection, ReferenceFrame, SurfaceKind};
use skyweave_math::GALACTIC_TO_EQUATORIAL;

use crate::payload::TextureData;

/// Identifies a dataset within one renderer session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DatasetId(pub u32);

/// How a tile payload is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    /// PNG or JPEG imagery.
    Image,
    /// Single-HDU FITS imagery.
    Fits,
    /// Delimited catalog rows.
    Catalog,
    /// 17x17 elevation grid.
    Elevation,
}

/// Immutable description of an imageset or catalog.
///
/// Shared by every tile in the tree through an `Arc`.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    pub projection: Projection,
    pub surface: SurfaceKind,
    pub frame: ReferenceFrame,
    /// Angular size of the level-0 tile, degrees.
    pub base_degrees: f64,
    /// Deepest level; tiles shallower than this have children.
    pub levels: u32,
    pub url_template: String,
    /// Space-separated list of file types the server offers.
    pub extensions: String,
    pub elevation_template: Option<String>,
    /// Tangent rows count up from the south.
    pub bottoms_up: bool,
    pub catalog: bool,
    pub delimiter: char,
    pub offset_x: f64,
    pub offset_y: f64,
    pub width_factor: f64,
    /// Rotates tangent-plane vectors into place on the sphere.
    pub orientation: DMat3,
    pub tile_pixels: u32,
    pub dem_scale_factor: f64,
    /// A single already-decoded image standing in for the whole tree.
    pub preloaded: Option<Arc<TextureData>>,
}

impl Dataset {
    /// A HEALPix sky survey with default settings.
    pub fn healpix(id: DatasetId, name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            projection: Projection::Healpix,
            surface: SurfaceKind::Sky,
            frame: ReferenceFrame::Equatorial,
            base_degrees: 180.0,
            levels: 9,
            url_template: url_template.into(),
            extensions: "jpeg".to_string(),
            elevation_template: None,
            bottoms_up: false,
            catalog: false,
            delimiter: '\t',
            offset_x: 0.0,
            offset_y: 0.0,
            width_factor: 2.0,
            orientation: DMat3::IDENTITY,
            tile_pixels: 512,
            dem_scale_factor: 6_371_000.0,
            preloaded: None,
        }
    }

    /// A tangent-plane mosaic centred on `(lat 0, lng 0)`.
    pub fn tangent(
        id: DatasetId,
        name: impl Into<String>,
        base_degrees: f64,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            projection: Projection::Tangent,
            base_degrees,
            levels: 4,
            tile_pixels: 256,
            ..Self::healpix(id, name, url_template)
        }
    }

    /// Build a dataset from its config entry.
    pub fn from_config(id: DatasetId, config: &DatasetConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            projection: config.projection,
            surface: config.surface,
            frame: config.frame,
            base_degrees: config.base_degrees,
            levels: config.levels,
            url_template: config.url_template.clone(),
            extensions: config.extensions.clone(),
            elevation_template: config.elevation_template.clone(),
            bottoms_up: config.bottoms_up,
            catalog: config.catalog,
            delimiter: config.delimiter,
            offset_x: config.offset_x,
            offset_y: config.offset_y,
            width_factor: config.width_factor,
            orientation: orientation_matrix(config.center.0, config.center.1, config.rotation_deg),
            tile_pixels: config.tile_pixels,
            dem_scale_factor: config.dem_scale_factor,
            preloaded: None,
        }
    }

    /// File extension for tile payloads, including the dot.
    pub fn file_extension(&self) -> &'static str {
        preferred_extension(&self.extensions)
    }

    /// How the main payload of each tile decodes.
    pub fn payload_kind(&self) -> PayloadKind {
        match (self.catalog, self.file_extension()) {
            (true, _) | (_, ".tsv") => PayloadKind::Catalog,
            (_, ".fits") => PayloadKind::Fits,
            _ => PayloadKind::Image,
        }
    }

    /// Rotation applied to HEALPix vertices, if the data is not equatorial.
    pub fn frame_rotation(&self) -> Option<DMat3> {
        match self.frame {
            ReferenceFrame::Equatorial => None,
            ReferenceFrame::Galactic => Some(GALACTIC_TO_EQUATORIAL),
        }
    }

    /// Deepest level tiles are created at, `levels` clamped to
    /// [`MAX_TILE_LEVEL`].
    pub fn deepest_level(&self) -> u32 {
        self.levels.min(MAX_TILE_LEVEL)
    }

    pub fn has_elevation(&self) -> bool {
        self.elevation_template.is_some()
    }

    /// True for planet-like surfaces, where LOD arcs are in degrees.
    pub fn is_planetary(&self) -> bool {
        matches!(self.surface, SurfaceKind::Planet | SurfaceKind::Earth)
    }
}

/// Pick an extension from a space-separated list, preferring
/// PNG, then JPEG, then TSV, then FITS. Defaults to JPEG.
pub fn preferred_extension(extensions: &str) -> &'static str {
    let list = extensions.to_ascii_lowercase();
    if list.contains("png") {
        ".png"
    } else if list.contains("jpeg") || list.contains("jpg") {
        ".jpg"
    } else if list.contains("tsv") {
        ".tsv"
    } else if list.contains("fits") {
        ".fits"
    } else {
        ".jpg"
    }
}

/// Orientation for a tangent plane centred at `(lat, lng)` and rotated by
/// `rotation_deg` about its view axis. Maps `+X` to the centre direction.
pub fn orientation_matrix(lat: f64, lng: f64, rotation_deg: f64) -> DMat3 {
    DMat3::from_rotation_z(lng.to_radians())
        * DMat3::from_rotation_y(-lat.to_radians())
        * DMat3::from_rotation_x(rotation_deg.to_radians())
}

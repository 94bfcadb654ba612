//! HEALPix tessellation: equal-area tiles that split into four equal children.

use glam::DVec3;
use skyweave_config::MAX_TILE_LEVEL;
use skyweave_math::{BoundingSphere, Fxyf, find_enclosing_sphere};

use crate::dataset::Dataset;
use crate::error::TileError;
use crate::key::TileCoord;
use crate::tessellation::{Corners, Tessellation, TileMesh, TileVertex, expand_template};

/// Tile images are bucketed into directories of this many files.
pub const DIRECTORY_BUCKET: u64 = 10_000;

/// One HEALPix tile: a `2^level` by `2^level` subdivision cell of a base face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealpixShape {
    level: u32,
    face: u8,
    face_x: u32,
    face_y: u32,
    tile_index: u64,
    ipix: u64,
}

impl HealpixShape {
    /// Root tile for face `x * 4 + y`, with `x` in `0..3` and `y` in `0..4`.
    pub fn root(x: u32, y: u32) -> Result<Self, TileError> {
        if x >= 3 || y >= 4 {
            return Err(TileError::InvalidAddress {
                level: 0,
                x,
                y,
                reason: "HEALPix roots need x < 3 and y < 4",
            });
        }
        let face = x * 4 + y;
        Ok(Self {
            level: 0,
            face: face as u8,
            face_x: 0,
            face_y: 0,
            tile_index: 0,
            ipix: face as u64,
        })
    }

    /// Tile for a nested pixel index at `level`.
    pub fn from_ipix(level: u32, ipix: u64) -> Result<Self, TileError> {
        let invalid = |reason| TileError::InvalidAddress {
            level,
            x: 0,
            y: 0,
            reason,
        };
        if level > MAX_TILE_LEVEL {
            return Err(invalid("level too deep for a nested pixel index"));
        }
        let per_face = 1u64 << (2 * level);
        let face = ipix / per_face;
        if face >= 12 {
            return Err(invalid("pixel index outside the sphere"));
        }
        let tile_index = ipix % per_face;
        Ok(Self {
            level,
            face: face as u8,
            face_x: compact_bits(tile_index),
            face_y: compact_bits(tile_index >> 1),
            tile_index,
            ipix,
        })
    }

    pub fn ipix(&self) -> u64 {
        self.ipix
    }

    pub fn face(&self) -> u8 {
        self.face
    }

    pub fn face_xy(&self) -> (u32, u32) {
        (self.face_x, self.face_y)
    }

    /// Index of this tile within its face.
    pub fn tile_index(&self) -> u64 {
        self.tile_index
    }

    /// Grid cells per axis. Shallow tiles cover large curved areas and
    /// sample densely; deep tiles are nearly flat.
    pub fn step(&self, catalog: bool) -> u32 {
        if catalog {
            return 2;
        }
        match self.level {
            0..=4 => 16,
            5 => 8,
            6 => 4,
            _ => 2,
        }
    }

    /// Project continuous face coordinates into render space.
    fn vertex(&self, dataset: &Dataset, fx: f64, fy: f64) -> DVec3 {
        let v = Fxyf::new(fx, fy, self.face).to_vec();
        match dataset.frame_rotation() {
            Some(m) => m * v,
            None => v,
        }
    }

    /// Row-major `(step + 1)^2` sample grid; row `i` runs along face y and
    /// column `j` along face x.
    fn grid_points(&self, dataset: &Dataset) -> Vec<DVec3> {
        let step = self.step(dataset.catalog);
        let n = (step as u64 * (1u64 << self.level)) as f64;
        let mut points = Vec::with_capacity(((step + 1) * (step + 1)) as usize);
        for i in 0..=step {
            for j in 0..=step {
                let fx = (self.face_x as f64 * step as f64 + j as f64) / n;
                let fy = (self.face_y as f64 * step as f64 + i as f64) / n;
                points.push(self.vertex(dataset, fx, fy));
            }
        }
        points
    }

    /// Level-0 and level-1 membership by face lookup. Corner tests are
    /// unreliable there because the tiles are too large and polar.
    fn contains_by_face(&self, dataset: &Dataset, point: DVec3) -> bool {
        let local = match dataset.frame_rotation() {
            Some(m) => m.transpose() * point,
            None => point,
        };
        let f = Fxyf::from_vec(local);
        if f.face != self.face {
            return false;
        }
        if self.level == 0 {
            return true;
        }
        let cells = 1u32 << self.level;
        let cell = |c: f64| ((c * cells as f64).floor() as u32).min(cells - 1);
        cell(f.fx) == self.face_x && cell(f.fy) == self.face_y
    }
}

impl Tessellation for HealpixShape {
    fn level(&self) -> u32 {
        self.level
    }

    fn coord(&self) -> TileCoord {
        TileCoord::Healpix { ipix: self.ipix }
    }

    fn address(&self) -> (u32, u32) {
        if self.level == 0 {
            (self.face as u32 / 4, self.face as u32 % 4)
        } else {
            (self.face_x, self.face_y)
        }
    }

    fn compute_boundaries(&self, dataset: &Dataset) -> Corners {
        let n = (1u64 << self.level) as f64;
        let (x_lo, x_hi) = (self.face_x as f64 / n, (self.face_x + 1) as f64 / n);
        let (y_lo, y_hi) = (self.face_y as f64 / n, (self.face_y + 1) as f64 / n);
        Corners {
            top_left: self.vertex(dataset, x_hi, y_hi),
            bottom_left: self.vertex(dataset, x_lo, y_hi),
            bottom_right: self.vertex(dataset, x_lo, y_lo),
            top_right: self.vertex(dataset, x_hi, y_lo),
        }
    }

    fn derive_url(&self, dataset: &Dataset, template: &str) -> String {
        let index = self.ipix;
        let dir = index / DIRECTORY_BUCKET * DIRECTORY_BUCKET;
        expand_template(
            template,
            &[
                ("level", &self.level.to_string()),
                ("dir", &dir.to_string()),
                ("index", &index.to_string()),
                ("ext", dataset.file_extension()),
            ],
        )
    }

    fn sample_vertices(&self, dataset: &Dataset) -> TileMesh {
        let step = self.step(dataset.catalog);
        let row = step + 1;
        let vertices = self
            .grid_points(dataset)
            .into_iter()
            .enumerate()
            .map(|(k, position)| {
                let (i, j) = (k as u32 / row, k as u32 % row);
                TileVertex::new(
                    position,
                    DVec3::ZERO,
                    i as f64 / step as f64,
                    j as f64 / step as f64,
                )
            })
            .collect();

        let half = step / 2;
        let parts = std::array::from_fn(|part| {
            let (a, b) = ((part / 2) as u32, (part % 2) as u32);
            let mut indices = Vec::with_capacity((half * half * 6) as usize);
            for i in a * half..(a + 1) * half {
                for j in b * half..(b + 1) * half {
                    let p = (i * row + j) as u16;
                    let r = row as u16;
                    indices.extend_from_slice(&[p, p + 1, p + r, p + 1, p + r, p + r + 1]);
                }
            }
            indices
        });

        TileMesh {
            origin: DVec3::ZERO,
            vertices,
            parts,
        }
    }

    fn bounding_sphere(&self, dataset: &Dataset) -> BoundingSphere {
        find_enclosing_sphere(&self.grid_points(dataset))
    }

    fn is_big_enough(&self, dataset: &Dataset, fov_scale: f64) -> bool {
        let span = if dataset.is_planetary() { 180.0 } else { 3600.0 };
        let arc = span / ((1u64 << self.level) as f64 * 4.0);
        fov_scale < arc
    }

    fn contains_point(&self, dataset: &Dataset, corners: &Corners, point: DVec3) -> bool {
        if self.level < 2 {
            self.contains_by_face(dataset, point)
        } else {
            corners.contains(point)
        }
    }

    fn child(&self, x1: u32, y1: u32) -> Box<dyn Tessellation> {
        let quadrant = (y1 * 2 + x1) as u64;
        Box::new(Self {
            level: self.level + 1,
            face: self.face,
            face_x: self.face_x * 2 + x1,
            face_y: self.face_y * 2 + y1,
            tile_index: self.tile_index * 4 + quadrant,
            ipix: self.ipix * 4 + quadrant,
        })
    }
}

/// Gather the even-position bits of `v` into a contiguous integer.
fn compact_bits(v: u64) -> u32 {
    let mut out = 0u32;
    for bit in 0..32 {
        out |= (((v >> (2 * bit)) & 1) as u32) << bit;
    }
    out
}

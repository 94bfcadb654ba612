//! View-frustum culling of bounding spheres in f64.
//!
//! Planes are extracted from a view-projection matrix with the
//! Gribb-Hartmann method, using wgpu clip conventions (depth in `[0, 1]`).

use glam::{DMat4, DVec3, DVec4};

use crate::BoundingSphere;

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Result of testing a volume against the frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    /// Entirely inside all six planes.
    Inside,
    /// Entirely outside at least one plane.
    Outside,
    /// Straddles one or more planes.
    Intersecting,
}

/// A view frustum made of six inward-pointing, normalized planes.
///
/// Each plane is `Vec4(a, b, c, d)`; a point `p` is inside when
/// `a*p.x + b*p.y + c*p.z + d >= 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    /// Build a frustum directly from six inward-facing planes.
    pub fn from_planes(planes: [DVec4; 6]) -> Self {
        let mut planes = planes;
        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 1e-12 {
                *plane /= len;
            }
        }
        Self { planes }
    }

    /// Extract the frustum from a combined view-projection matrix.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        Self::from_planes(planes)
    }

    /// Frustum for a camera at the origin looking along `forward`.
    ///
    /// This is the usual sky-view setup: the imagery lives on the unit
    /// sphere around the eye, so `near < 1 < far` keeps it in range.
    pub fn looking_along(
        forward: DVec3,
        up: DVec3,
        fov_y_deg: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let view = DMat4::look_to_rh(DVec3::ZERO, forward, up);
        let proj = DMat4::perspective_rh(fov_y_deg.to_radians(), aspect, near, far);
        Self::from_view_projection(&(proj * view))
    }

    /// A frustum that accepts everything. Useful for prefetching whole datasets.
    pub fn unbounded() -> Self {
        Self {
            planes: [DVec4::new(0.0, 0.0, 0.0, 1.0); 6],
        }
    }

    /// The six planes, ordered left, right, bottom, top, near, far.
    pub fn planes(&self) -> &[DVec4; 6] {
        &self.planes
    }

    /// Test whether a point is inside all six planes.
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    /// Classify a sphere against the frustum.
    pub fn classify_sphere(&self, sphere: &BoundingSphere) -> Intersection {
        let mut all_inside = true;
        for plane in &self.planes {
            let dist = plane.truncate().dot(sphere.center) + plane.w;
            if dist < -sphere.radius {
                return Intersection::Outside;
            }
            if dist < sphere.radius {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersecting
        }
    }

    /// Returns true if any part of the sphere could be visible.
    ///
    /// Conservative: may accept spheres near frustum corners that are
    /// actually outside, but never rejects a visible one.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.classify_sphere(sphere) != Intersection::Outside
    }
}

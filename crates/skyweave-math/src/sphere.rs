//! Enclosing spheres for tile vertex sets, used for frustum culling.

use glam::DVec3;

/// A bounding sphere in unit-sphere (or tangent-plane) space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: DVec3,
    /// Radius of the sphere.
    pub radius: f64,
}

impl BoundingSphere {
    /// Create a sphere from a center and radius.
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Returns true if `point` lies inside or on the sphere (with a small tolerance).
    pub fn contains(&self, point: DVec3) -> bool {
        (point - self.center).length() <= self.radius * (1.0 + 1e-9) + 1e-12
    }
}

/// Find a sphere enclosing every point of `points`.
///
/// Starts from the widest pair found by two farthest-point sweeps, grows the
/// sphere to swallow each outlier (Ritter), then tightens the radius to the
/// true maximum distance from the final center so the result always encloses
/// the input. Within a few percent of the minimal sphere for the convex,
/// gently curved patches produced by tile tessellation.
///
/// An empty slice yields a zero sphere at the origin.
pub fn find_enclosing_sphere(points: &[DVec3]) -> BoundingSphere {
    let Some(&first) = points.first() else {
        return BoundingSphere::new(DVec3::ZERO, 0.0);
    };

    let far_a = farthest_from(points, first);
    let far_b = farthest_from(points, far_a);

    let mut center = (far_a + far_b) * 0.5;
    let mut radius = (far_b - far_a).length() * 0.5;

    for &p in points {
        let offset = p - center;
        let dist = offset.length();
        if dist > radius {
            let grown = (radius + dist) * 0.5;
            center += offset * ((grown - radius) / dist);
            radius = grown;
        }
    }

    let max_dist = points
        .iter()
        .map(|p| (*p - center).length())
        .fold(0.0_f64, f64::max);

    BoundingSphere::new(center, radius.max(max_dist))
}

fn farthest_from(points: &[DVec3], origin: DVec3) -> DVec3 {
    points
        .iter()
        .copied()
        .max_by(|a, b| {
            a.distance_squared(origin)
                .partial_cmp(&b.distance_squared(origin))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_zero_sphere() {
        let s = find_enclosing_sphere(&[]);
        assert_eq!(s.center, DVec3::ZERO);
        assert_eq!(s.radius, 0.0);
    }

    #[test]
    fn test_single_point() {
        let p = DVec3::new(1.0, 2.0, 3.0);
        let s = find_enclosing_sphere(&[p]);
        assert_eq!(s.center, p);
        assert_eq!(s.radius, 0.0);
    }

    #[test]
    fn test_two_points_diameter() {
        let s = find_enclosing_sphere(&[DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0)]);
        assert!(s.center.length() < 1e-12);
        assert!((s.radius - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_encloses_all_points() {
        let mut pts = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                let lat = -10.0 + i as f64;
                let lng = 30.0 + j as f64 * 0.7;
                pts.push(crate::geo_to_vec(lat, lng));
            }
        }
        let s = find_enclosing_sphere(&pts);
        for p in &pts {
            assert!(s.contains(*p), "point {p} outside sphere {s:?}");
        }
        // A 19x13 degree patch should have a radius well under 0.25 units.
        assert!(s.radius < 0.25, "radius too loose: {}", s.radius);
    }

    #[test]
    fn test_cube_corners() {
        let mut pts = Vec::new();
        for &x in &[-1.0, 1.0] {
            for &y in &[-1.0, 1.0] {
                for &z in &[-1.0, 1.0] {
                    pts.push(DVec3::new(x, y, z));
                }
            }
        }
        let s = find_enclosing_sphere(&pts);
        for p in &pts {
            assert!(s.contains(*p));
        }
        let minimal = 3.0_f64.sqrt();
        assert!(s.radius >= minimal - 1e-9);
        assert!(s.radius < minimal * 1.1);
    }
}

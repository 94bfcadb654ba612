//! Latitude/longitude conversions and great-circle helpers on the unit sphere.
//!
//! All angles crossing this API are in degrees. The sphere is right-handed
//! and z-up: latitude 90 is `+Z`, longitude 0 on the equator is `+X`, and
//! longitude 90 is `+Y`. For sky data, longitude is right ascension.

use glam::{DVec2, DVec3};

/// Convert a latitude/longitude pair (degrees) to a unit vector.
pub fn geo_to_vec(lat: f64, lng: f64) -> DVec3 {
    let (lat, lng) = (lat.to_radians(), lng.to_radians());
    DVec3::new(lat.cos() * lng.cos(), lat.cos() * lng.sin(), lat.sin())
}

/// Convert a direction to `(lat, lng)` in degrees. Longitude is in `(-180, 180]`.
///
/// A zero vector maps to `(0, 0)`.
pub fn vec_to_geo(v: DVec3) -> (f64, f64) {
    let v = v.normalize_or_zero();
    if v == DVec3::ZERO {
        return (0.0, 0.0);
    }
    let lat = v.z.clamp(-1.0, 1.0).asin().to_degrees();
    let lng = v.y.atan2(v.x).to_degrees();
    (lat, lng)
}

/// Great-circle separation between two directions, in degrees.
///
/// Uses `atan2(|a x b|, a . b)`, which stays accurate for both tiny and
/// near-antipodal separations where `acos` loses precision.
pub fn angular_distance_deg(a: DVec3, b: DVec3) -> f64 {
    let a = a.normalize_or_zero();
    let b = b.normalize_or_zero();
    a.cross(b).length().atan2(a.dot(b)).to_degrees()
}

/// Returns true if `point` lies strictly on the left of the great circle
/// running from `a` to `b` (positive side of the plane `a x b`).
pub fn is_left_of_half_space(a: DVec3, b: DVec3, point: DVec3) -> bool {
    a.normalize_or_zero()
        .cross(b.normalize_or_zero())
        .dot(point)
        > 0.0
}

/// Bilinear-style `(u, v)` coordinates of a point inside a spherical quad.
///
/// `u` runs from the left edge (0) to the right edge (1), `v` from the top
/// edge (0) to the bottom edge (1). Each coordinate is the ratio of the
/// point's distance to the two opposing great-circle planes, so it is exact
/// on the edges and smooth inside. Degenerate edges fall back to 0.5.
pub fn uv_from_inner_point(
    top_left: DVec3,
    top_right: DVec3,
    bottom_left: DVec3,
    bottom_right: DVec3,
    point: DVec3,
) -> DVec2 {
    let p = point.normalize_or_zero();

    let left = plane_distance(top_left, bottom_left, p);
    let right = plane_distance(top_right, bottom_right, p);
    let top = plane_distance(top_left, top_right, p);
    let bottom = plane_distance(bottom_left, bottom_right, p);

    DVec2::new(ratio(left, right), ratio(top, bottom))
}

fn plane_distance(a: DVec3, b: DVec3, p: DVec3) -> f64 {
    a.cross(b).normalize_or_zero().dot(p).abs()
}

fn ratio(near: f64, far: f64) -> f64 {
    let total = near + far;
    if total <= f64::EPSILON {
        0.5
    } else {
        near / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_geo_to_vec_axes() {
        assert!((geo_to_vec(0.0, 0.0) - DVec3::X).length() < EPS);
        assert!((geo_to_vec(0.0, 90.0) - DVec3::Y).length() < EPS);
        assert!((geo_to_vec(90.0, 0.0) - DVec3::Z).length() < EPS);
        assert!((geo_to_vec(-90.0, 45.0) + DVec3::Z).length() < EPS);
    }

    #[test]
    fn test_geo_roundtrip_preserves_coordinates() {
        for &(lat, lng) in &[(12.5, 33.0), (-45.0, -120.0), (80.0, 179.0), (0.0, -1.0)] {
            let (lat2, lng2) = vec_to_geo(geo_to_vec(lat, lng));
            assert!((lat - lat2).abs() < 1e-9, "lat {lat} -> {lat2}");
            assert!((lng - lng2).abs() < 1e-9, "lng {lng} -> {lng2}");
        }
    }

    #[test]
    fn test_vec_to_geo_zero_vector() {
        assert_eq!(vec_to_geo(DVec3::ZERO), (0.0, 0.0));
    }

    #[test]
    fn test_angular_distance() {
        let d = angular_distance_deg(geo_to_vec(0.0, 0.0), geo_to_vec(0.0, 90.0));
        assert!((d - 90.0).abs() < 1e-9);

        let d = angular_distance_deg(geo_to_vec(10.0, 20.0), geo_to_vec(10.0, 20.0));
        assert!(d.abs() < 1e-9);

        let d = angular_distance_deg(DVec3::X, -DVec3::X);
        assert!((d - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_space_sides() {
        // Equator traversed eastwards: the northern hemisphere is on the left.
        let a = geo_to_vec(0.0, 0.0);
        let b = geo_to_vec(0.0, 90.0);
        assert!(is_left_of_half_space(a, b, geo_to_vec(30.0, 45.0)));
        assert!(!is_left_of_half_space(a, b, geo_to_vec(-30.0, 45.0)));
    }

    #[test]
    fn test_uv_center_of_quad() {
        let tl = geo_to_vec(10.0, -10.0);
        let tr = geo_to_vec(10.0, 10.0);
        let bl = geo_to_vec(-10.0, -10.0);
        let br = geo_to_vec(-10.0, 10.0);

        let uv = uv_from_inner_point(tl, tr, bl, br, geo_to_vec(0.0, 0.0));
        assert!((uv.x - 0.5).abs() < 1e-9);
        assert!((uv.y - 0.5).abs() < 1e-9);

        let uv = uv_from_inner_point(tl, tr, bl, br, geo_to_vec(5.0, -5.0));
        assert!(uv.x < 0.5 && uv.y < 0.5, "expected upper-left quadrant, got {uv}");
    }

    #[test]
    fn test_uv_on_edges() {
        let tl = geo_to_vec(10.0, -10.0);
        let tr = geo_to_vec(10.0, 10.0);
        let bl = geo_to_vec(-10.0, -10.0);
        let br = geo_to_vec(-10.0, 10.0);

        let uv = uv_from_inner_point(tl, tr, bl, br, tl);
        assert!(uv.x.abs() < 1e-9);
        assert!(uv.y.abs() < 1e-9);

        let uv = uv_from_inner_point(tl, tr, bl, br, br);
        assert!((uv.x - 1.0).abs() < 1e-9);
        assert!((uv.y - 1.0).abs() < 1e-9);
    }
}

//! Geometry primitives for sky and planet tiling: spherical coordinates,
//! HEALPix face math, bounding spheres, and frustum culling in f64.

mod frustum;
mod geo;
pub mod healpix;
mod sphere;

pub use frustum::{Frustum, Intersection};
pub use geo::{
    angular_distance_deg, geo_to_vec, is_left_of_half_space, uv_from_inner_point, vec_to_geo,
};
pub use healpix::{Fxyf, GALACTIC_TO_EQUATORIAL};
pub use sphere::{BoundingSphere, find_enclosing_sphere};

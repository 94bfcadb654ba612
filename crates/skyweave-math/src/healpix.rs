//! HEALPix continuous face coordinates.
//!
//! The sphere is split into 12 base faces. A point on a face is addressed by
//! `(fx, fy)` in `[0, 1]^2`; `fx` grows towards the face's north-east edge
//! and `fy` towards its north-west edge (the nested-scheme convention), so
//! pixel `(ix, iy)` of an `nside` grid spans `[ix/nside, (ix+1)/nside]` x
//! `[iy/nside, (iy+1)/nside]`.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::{DMat3, DVec3};

/// Ring index of each face's southern corner, in units of `nside`.
const JRLL: [f64; 12] = [2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0, 4.0, 4.0, 4.0, 4.0];
/// Longitude index of each face's center, in units of `pi/4`.
const JPLL: [f64; 12] = [1.0, 3.0, 5.0, 7.0, 0.0, 2.0, 4.0, 6.0, 1.0, 3.0, 5.0, 7.0];

/// Number of HEALPix base faces.
pub const FACE_COUNT: u8 = 12;

/// Rotation taking galactic unit vectors to equatorial (J2000) unit vectors.
pub const GALACTIC_TO_EQUATORIAL: DMat3 = DMat3::from_cols_array(&[
    -0.054_875_560_402_435_9,
    -0.873_437_090_234_885_0,
    -0.483_835_015_548_713_2,
    0.494_109_427_875_583_7,
    -0.444_829_629_960_011_2,
    0.746_982_244_497_218_9,
    -0.867_666_149_019_004_7,
    -0.198_076_373_431_201_5,
    0.455_983_776_175_066_9,
]);

/// A continuous position on one HEALPix base face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fxyf {
    /// Coordinate along the face's x axis, in `[0, 1]`.
    pub fx: f64,
    /// Coordinate along the face's y axis, in `[0, 1]`.
    pub fy: f64,
    /// Base face index, `0..12`.
    pub face: u8,
}

impl Fxyf {
    /// Create a face position. `face` is taken modulo 12.
    pub fn new(fx: f64, fy: f64, face: u8) -> Self {
        Self {
            fx,
            fy,
            face: face % FACE_COUNT,
        }
    }

    /// Project the face position onto the unit sphere.
    pub fn to_vec(self) -> DVec3 {
        let face = self.face as usize;
        let jr = JRLL[face] - self.fx - self.fy;

        let (nr, z, sin_theta) = if jr < 1.0 {
            let nr = jr;
            let tmp = nr * nr / 3.0;
            let z = 1.0 - tmp;
            // Near the pole compute sin(theta) directly to keep precision.
            let sth = (tmp * (2.0 - tmp)).max(0.0).sqrt();
            (nr, z, sth)
        } else if jr > 3.0 {
            let nr = 4.0 - jr;
            let tmp = nr * nr / 3.0;
            let z = tmp - 1.0;
            let sth = (tmp * (2.0 - tmp)).max(0.0).sqrt();
            (nr, z, sth)
        } else {
            let z = (2.0 - jr) * 2.0 / 3.0;
            (1.0, z, ((1.0 - z) * (1.0 + z)).max(0.0).sqrt())
        };

        let mut tmp = JPLL[face] * nr + self.fx - self.fy;
        if tmp < 0.0 {
            tmp += 8.0;
        }
        if tmp >= 8.0 {
            tmp -= 8.0;
        }
        let phi = if nr < 1e-15 {
            0.0
        } else {
            0.5 * FRAC_PI_2 * tmp / nr
        };

        DVec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), z)
    }

    /// Locate a direction on its HEALPix base face.
    pub fn from_vec(v: DVec3) -> Self {
        let v = v.normalize_or_zero();
        let z = v.z.clamp(-1.0, 1.0);
        let mut phi = v.y.atan2(v.x);
        if phi < 0.0 {
            phi += TAU;
        }
        // tt in [0, 4)
        let tt = (phi / FRAC_PI_2).rem_euclid(4.0);
        let za = z.abs();

        if za <= 2.0 / 3.0 {
            let temp1 = 0.5 + tt;
            let temp2 = z * 0.75;
            let jp = temp1 - temp2;
            let jm = temp1 + temp2;
            let ifp = jp.floor() as i32;
            let ifm = jm.floor() as i32;
            let face = if ifp == ifm {
                (ifp | 4) as u8
            } else if ifp < ifm {
                ifp as u8
            } else {
                (ifm + 8) as u8
            };
            Self::new(jm - jm.floor(), 1.0 - (jp - jp.floor()), face)
        } else {
            let ntt = (tt.floor() as i32).min(3);
            let tp = tt - ntt as f64;
            let tmp = (3.0 * (1.0 - za)).sqrt();
            let jp = (tp * tmp).min(1.0);
            let jm = ((1.0 - tp) * tmp).min(1.0);
            if z >= 0.0 {
                Self::new(1.0 - jm, 1.0 - jp, ntt as u8)
            } else {
                Self::new(jp, jm, (ntt + 8) as u8)
            }
        }
    }
}

/// Solid angle of one pixel at `order` (`nside = 2^order`), in steradians.
pub fn pixel_solid_angle(order: u32) -> f64 {
    let nside = 2.0_f64.powi(order as i32);
    4.0 * PI / (12.0 * nside * nside)
}

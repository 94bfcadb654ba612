//! Decoding fetched bytes into texture, elevation, and catalog data.

use crate::catalog::{CatalogRow, parse_catalog_rows};
use crate::dataset::PayloadKind;
use crate::error::DecodeError;
use crate::fits::decode_fits;

/// Samples per edge of an elevation grid.
pub const ELEVATION_EDGE: usize = 17;

/// Texel layout of decoded imagery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexelFormat {
    /// 8-bit RGBA, sRGB.
    Rgba8,
    /// One 32-bit float channel, for FITS data.
    R32Float,
}

impl TexelFormat {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TexelFormat::Rgba8 | TexelFormat::R32Float => 4,
        }
    }
}

/// Decoded pixels ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
    pub bytes: Vec<u8>,
}

impl TextureData {
    pub fn rgba8(width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: TexelFormat::Rgba8,
            bytes,
        }
    }

    /// Byte count implied by the dimensions and format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_texel()
    }
}

/// A 17x17 grid of elevation samples in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct ElevationGrid {
    samples: Vec<f32>,
    average: f64,
}

impl ElevationGrid {
    pub fn new(samples: Vec<f32>) -> Result<Self, DecodeError> {
        let expected = ELEVATION_EDGE * ELEVATION_EDGE;
        if samples.len() != expected {
            return Err(DecodeError::ElevationSize {
                expected: expected * 4,
                actual: samples.len() * 4,
            });
        }
        let average = samples.iter().map(|&s| s as f64).sum::<f64>() / expected as f64;
        Ok(Self { samples, average })
    }

    /// Sample at column `u`, row `v`.
    pub fn sample(&self, u: usize, v: usize) -> f64 {
        self.samples[u + ELEVATION_EDGE * v] as f64
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    /// Bilinear interpolation at texture coordinates in `[0, 1]`.
    pub fn interpolate(&self, u: f64, v: f64) -> f64 {
        let cells = (ELEVATION_EDGE - 1) as f64;
        let ud = (u * cells).clamp(0.0, cells);
        let vd = (v * cells).clamp(0.0, cells);
        let uu = (ud as usize).min(ELEVATION_EDGE - 2);
        let vv = (vd as usize).min(ELEVATION_EDGE - 2);
        let (ha, va) = (ud - uu as f64, vd - vv as f64);

        let top = self.sample(uu, vv) * (1.0 - ha) + self.sample(uu + 1, vv) * ha;
        let bottom = self.sample(uu, vv + 1) * (1.0 - ha) + self.sample(uu + 1, vv + 1) * ha;
        top * (1.0 - va) + bottom * va
    }
}

/// A decoded tile payload.
#[derive(Clone, Debug)]
pub enum Payload {
    Texture(TextureData),
    Rows(Vec<CatalogRow>),
    Elevation(ElevationGrid),
}

/// Decode `bytes` according to `kind`.
pub fn decode_payload(kind: PayloadKind, bytes: &[u8], delimiter: char) -> Result<Payload, DecodeError> {
    match kind {
        PayloadKind::Image => decode_image(bytes).map(Payload::Texture),
        PayloadKind::Fits => decode_fits(bytes).map(Payload::Texture),
        PayloadKind::Catalog => Ok(Payload::Rows(parse_catalog_rows(
            &String::from_utf8_lossy(bytes),
            delimiter,
        ))),
        PayloadKind::Elevation => decode_elevation(bytes).map(Payload::Elevation),
    }
}

/// Decode PNG or JPEG bytes to RGBA8.
pub fn decode_image(bytes: &[u8]) -> Result<TextureData, DecodeError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TextureData::rgba8(width, height, rgba.into_raw()))
}

/// Decode a little-endian `f32` 17x17 grid.
pub fn decode_elevation(bytes: &[u8]) -> Result<ElevationGrid, DecodeError> {
    let expected = ELEVATION_EDGE * ELEVATION_EDGE * 4;
    if bytes.len() != expected {
        return Err(DecodeError::ElevationSize {
            expected,
            actual: bytes.len(),
        });
    }
    let samples = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    ElevationGrid::new(samples)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(2, 3, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn ramp_grid() -> Vec<u8> {
        (0..ELEVATION_EDGE * ELEVATION_EDGE)
            .flat_map(|i| ((i % ELEVATION_EDGE) as f32 * 10.0).to_le_bytes())
            .collect()
    }

    #[test]
    fn test_decode_png() {
        let tex = decode_image(&png_bytes()).unwrap();
        assert_eq!((tex.width, tex.height), (2, 3));
        assert_eq!(tex.format, TexelFormat::Rgba8);
        assert_eq!(tex.bytes.len(), tex.expected_len());
        // Pixel (1, 2)
        let i = (2 * 2 + 1) * 4;
        assert_eq!(&tex.bytes[i..i + 4], &[1, 2, 7, 255]);
    }

    #[test]
    fn test_decode_garbage_image_fails() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn test_elevation_grid() {
        let grid = decode_elevation(&ramp_grid()).unwrap();
        assert_eq!(grid.sample(3, 9), 30.0);
        assert!((grid.average() - 80.0).abs() < 1e-9);
        // Halfway between columns 2 and 3.
        let u = 2.5 / 16.0;
        assert!((grid.interpolate(u, 0.4) - 25.0).abs() < 1e-9);
        assert!((grid.interpolate(1.0, 1.0) - 160.0).abs() < 1e-9);
        assert!((grid.interpolate(-3.0, 0.0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_elevation_wrong_size() {
        assert!(matches!(
            decode_elevation(&[0u8; 16]),
            Err(DecodeError::ElevationSize {
                expected: 1156,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_decode_payload_dispatch() {
        let rows = decode_payload(PayloadKind::Catalog, b"ra\tdec\n1\t2\n", '\t').unwrap();
        assert!(matches!(rows, Payload::Rows(r) if r.len() == 1));
        let tex = decode_payload(PayloadKind::Image, &png_bytes(), '\t').unwrap();
        assert!(matches!(tex, Payload::Texture(_)));
    }
}

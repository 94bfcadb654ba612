//! Minimal single-HDU FITS image decoding.
//!
//! Reads the primary header, then the first 2D plane of the data unit,
//! applying `BSCALE`/`BZERO`. Output is one `f32` per pixel in file order.

use crate::error::DecodeError;
use crate::payload::{TexelFormat, TextureData};

const BLOCK: usize = 2880;
const CARD: usize = 80;

#[derive(Debug, Default)]
struct Header {
    bitpix: Option<i64>,
    naxis: Option<i64>,
    naxis1: Option<i64>,
    naxis2: Option<i64>,
    bscale: f64,
    bzero: f64,
}

/// Decode a FITS file into an `R32Float` texture.
pub fn decode_fits(bytes: &[u8]) -> Result<TextureData, DecodeError> {
    let (header, data_start) = parse_header(bytes)?;

    let bitpix = header
        .bitpix
        .ok_or_else(|| DecodeError::FitsHeader("missing BITPIX".into()))?;
    let naxis = header.naxis.unwrap_or(0);
    if naxis < 2 {
        return Err(DecodeError::FitsHeader(format!("NAXIS {naxis} is not an image")));
    }
    let dim = |v: Option<i64>, name: &str| match v {
        Some(n) if n > 0 && n <= u32::MAX as i64 => Ok(n as u32),
        _ => Err(DecodeError::FitsHeader(format!("bad {name}"))),
    };
    let width = dim(header.naxis1, "NAXIS1")?;
    let height = dim(header.naxis2, "NAXIS2")?;

    let bytes_per_value = match bitpix {
        8 => 1,
        16 => 2,
        32 | -32 => 4,
        -64 => 8,
        other => return Err(DecodeError::UnsupportedBitpix(other)),
    };
    let count = width as usize * height as usize;
    let expected = count * bytes_per_value;
    let data = bytes.get(data_start..).unwrap_or_default();
    if data.len() < expected {
        return Err(DecodeError::FitsTruncated {
            expected,
            actual: data.len(),
        });
    }

    let (scale, zero) = (header.bscale, header.bzero);
    let mut out = Vec::with_capacity(count * 4);
    for raw in data[..expected].chunks_exact(bytes_per_value) {
        let value = match bitpix {
            8 => raw[0] as f64,
            16 => i16::from_be_bytes([raw[0], raw[1]]) as f64,
            32 => i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            -32 => f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            _ => {
                let mut b = [0u8; 8];
                b.copy_from_slice(raw);
                f64::from_be_bytes(b)
            }
        };
        out.extend_from_slice(&((zero + scale * value) as f32).to_le_bytes());
    }

    Ok(TextureData {
        width,
        height,
        format: TexelFormat::R32Float,
        bytes: out,
    })
}

/// Parse header cards up to `END`. Returns the header and the byte offset of
/// the data unit.
fn parse_header(bytes: &[u8]) -> Result<(Header, usize), DecodeError> {
    let mut header = Header {
        bscale: 1.0,
        ..Header::default()
    };

    for (i, card) in bytes.chunks_exact(CARD).enumerate() {
        let card = std::str::from_utf8(card)
            .ok()
            .filter(|c| c.is_ascii())
            .ok_or_else(|| DecodeError::FitsHeader(format!("card {i} is not ASCII")))?;
        let keyword = card[..8].trim_end();
        if keyword == "END" {
            let header_len = (i + 1) * CARD;
            return Ok((header, header_len.div_ceil(BLOCK) * BLOCK));
        }
        if i == 0 && keyword != "SIMPLE" {
            return Err(DecodeError::FitsHeader("first card is not SIMPLE".into()));
        }
        if &card[8..10] != "= " {
            continue;
        }
        let value = card[10..].split('/').next().unwrap_or_default().trim();
        let int = || value.parse::<i64>().ok();
        let float = || value.replace('D', "E").parse::<f64>().ok();
        match keyword {
            "BITPIX" => header.bitpix = int(),
            "NAXIS" => header.naxis = int(),
            "NAXIS1" => header.naxis1 = int(),
            "NAXIS2" => header.naxis2 = int(),
            "BSCALE" => header.bscale = float().unwrap_or(1.0),
            "BZERO" => header.bzero = float().unwrap_or(0.0),
            _ => {}
        }
    }
    Err(DecodeError::FitsHeader("no END card".into()))
}

//! Error types for tile acquisition, decoding, and device uploads.

use crate::key::TileId;

/// A fetch could not produce bytes.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Nothing exists at the URL.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// The transport reported a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// I/O failure while reading the payload.
    #[error("failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The fetch worker pool is gone.
    #[error("fetch workers shut down")]
    Shutdown,

    /// A fetch worker thread could not be started.
    #[error("failed to spawn fetch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A payload arrived but could not be turned into tile data.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// PNG/JPEG decoding failed.
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    /// The FITS header is missing a required card or has a bad value.
    #[error("bad FITS header: {0}")]
    FitsHeader(String),

    /// The FITS data unit is shorter than the header promises.
    #[error("FITS data truncated: expected {expected} bytes, got {actual}")]
    FitsTruncated { expected: usize, actual: usize },

    /// BITPIX value this decoder does not handle.
    #[error("unsupported FITS BITPIX {0}")]
    UnsupportedBitpix(i64),

    /// Elevation payload has the wrong number of bytes.
    #[error("elevation grid must be {expected} bytes, got {actual}")]
    ElevationSize { expected: usize, actual: usize },
}

/// The graphics device refused an allocation.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Vertex or index data was empty.
    #[error("empty upload for {label}")]
    EmptyUpload { label: String },

    /// A 16-bit index references a vertex that does not exist.
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u16, vertex_count: usize },

    /// Texture bytes do not match its dimensions.
    #[error("texture {width}x{height} expects {expected} bytes, got {actual}")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The device ran out of memory for a buffer or texture.
    #[error("out of device memory allocating {label}")]
    OutOfMemory { label: String },

    /// The backend could not provide an adapter or device.
    #[error("no graphics adapter: {0}")]
    NoAdapter(String),
}

/// Umbrella error for tile operations.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A handle or key does not name a live tile.
    #[error("unknown tile {0:?}")]
    UnknownTile(TileId),

    /// Root or child coordinates outside the quadtree.
    #[error("invalid tile address level {level} ({x}, {y}): {reason}")]
    InvalidAddress {
        level: u32,
        x: u32,
        y: u32,
        reason: &'static str,
    },
}

//! Adaptive tile quadtrees for sky surveys and planet surfaces: HEALPix and
//! tangent-plane tessellation, the tile cache and fetch queue, level-of-detail
//! traversal, catalog row streaming, and surface altitude queries.

mod altitude;
pub mod cache;
pub mod catalog;
pub mod context;
pub mod dataset;
pub mod device;
mod draw;
pub mod error;
pub mod fetch;
pub mod fits;
pub mod healpix_tile;
pub mod key;
pub mod layer;
pub mod payload;
pub mod tangent_tile;
pub mod tessellation;
pub mod tile;
pub mod wgpu_device;

pub use cache::{LoadOutcome, PurgeReport, TileCache};
pub use catalog::{CatalogRow, CatalogSink, VisibleRows, parse_catalog_rows};
pub use context::{FrameStats, RenderContext, fov_scale_for};
pub use dataset::{Dataset, DatasetId, PayloadKind};
pub use device::{DrawCall, GraphicsDevice, HeadlessDevice, MeshHandle, TextureHandle};
pub use error::{DecodeError, DeviceError, FetchError, TileError};
pub use fetch::{
    FetchCompletion, FetchRequest, FetchTicket, Fetcher, HostFetcher, PooledFetcher, Transport,
    file_transport,
};
pub use healpix_tile::HealpixShape;
pub use key::{TileCoord, TileId, TileKey};
pub use layer::{ImagesetLayer, run_frame};
pub use payload::{ElevationGrid, TexelFormat, TextureData};
pub use tangent_tile::TangentShape;
pub use tessellation::{Corners, Tessellation, TileMesh, TileVertex};
pub use tile::{LoadState, QuadrantVisibility, Tile};
pub use wgpu_device::{WgpuDevice, tile_vertex_layout};

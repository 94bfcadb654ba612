//! Configuration for the skyweave tile renderer.
//!
//! Settings persist to disk as RON, accept CLI overrides via clap, and
//! tolerate missing or unknown fields so older files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DatasetConfig, DebugConfig, MAX_TILE_LEVEL, Projection, ReferenceFrame, SurfaceKind,
    TileConfig, ViewConfig, default_config_dir,
};
pub use error::ConfigError;

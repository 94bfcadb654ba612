//! Headless frame loop over the configured datasets.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags. Tile URLs resolve as paths below the config directory.
//! Run with `cargo run -p skyweave-demo -- --frames 60 --fov 5`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use glam::DVec3;
use skyweave_config::{CliArgs, Config, default_config_dir};
use skyweave_math::{Frustum, geo_to_vec};
use skyweave_tiles::{
    Dataset, DatasetId, FrameStats, GraphicsDevice, HeadlessDevice, ImagesetLayer, PooledFetcher,
    RenderContext, TileCache, VisibleRows, file_transport, fov_scale_for, run_frame,
};
use tracing::{debug, info, warn};

/// Pixel height of the virtual viewport used for level-of-detail decisions.
const VIEWPORT_HEIGHT: u32 = 1080;

/// Pause between frames so fetch workers can make progress.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    skyweave_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        warn!("{e}");
        std::process::exit(2);
    }

    match run(&config, &config_dir) {
        Ok(stats) => info!(
            deepest_level = stats.deepest_level,
            tiles_in_view = stats.tiles_in_view,
            triangles = stats.triangles_rendered,
            "demo finished"
        ),
        Err(e) => {
            warn!("demo failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Camera frustum looking out from the sphere centre at `(lat, lng)`.
fn camera(config: &Config) -> Frustum {
    let view = &config.view;
    let forward = geo_to_vec(view.look_dec_deg, view.look_ra_deg);
    let up = if view.look_dec_deg.abs() > 89.0 {
        DVec3::X
    } else {
        DVec3::Z
    };
    Frustum::looking_along(forward, up, view.fov_degrees, view.aspect, 0.01, 10.0)
}

fn run(config: &Config, data_root: &Path) -> Result<FrameStats, Box<dyn std::error::Error>> {
    let transport = file_transport(data_root);
    let fetcher = match config.tiles.fetch_threads {
        0 => PooledFetcher::with_defaults(transport)?,
        n => PooledFetcher::new(n, transport)?,
    };
    info!(workers = fetcher.worker_count(), root = %data_root.display(), "fetcher ready");

    let mut cache = TileCache::new(config.tiles.clone());
    let mut layers = Vec::with_capacity(config.datasets.len());
    for (i, dataset) in config.datasets.iter().enumerate() {
        let dataset = Arc::new(Dataset::from_config(DatasetId(i as u32), dataset));
        layers.push(ImagesetLayer::new(&mut cache, dataset)?);
    }

    let planetary = layers.first().is_some_and(|l| l.dataset().is_planetary());
    let fov_scale = fov_scale_for(config.view.fov_degrees, VIEWPORT_HEIGHT, planetary);
    let frustum = camera(config);

    let mut device = HeadlessDevice::new();
    let mut rows = VisibleRows::new();
    let mut stats = FrameStats::default();
    for frame in 0..config.view.frames {
        let mut ctx = RenderContext::new(frustum.clone(), fov_scale, &mut device);
        stats = run_frame(&mut cache, &layers, &mut ctx, &fetcher, &mut rows);
        let draws = device.take_draw_calls().len();
        debug!(
            frame,
            draws,
            touched = stats.tiles_touched,
            in_view = stats.tiles_in_view,
            deepest = stats.deepest_level,
            queued = cache.queue_len(),
            downloading = cache.downloading(),
            "frame"
        );
        std::thread::sleep(FRAME_INTERVAL);
    }

    info!(
        tiles = cache.len(),
        meshes = device.live_meshes(),
        textures = device.live_textures(),
        catalog_rows = rows.row_count(),
        "cache after {} frames",
        config.view.frames
    );
    report_altitude(config, &cache, &layers)?;
    Ok(stats)
}

/// Log the surface altitude under the camera for planetary layers.
fn report_altitude(
    config: &Config,
    cache: &TileCache,
    layers: &[ImagesetLayer],
) -> Result<(), skyweave_tiles::TileError> {
    let (lat, lng) = (config.view.look_dec_deg, config.view.look_ra_deg);
    for layer in layers.iter().filter(|l| l.dataset().has_elevation()) {
        for &root in layer.roots() {
            if cache.is_point_in_tile(root, lat, lng)? {
                let meters = cache.surface_point_altitude(root, lat, lng, true)?;
                info!(dataset = %layer.dataset().name, lat, lng, meters, "surface altitude");
                break;
            }
        }
    }
    Ok(())
}

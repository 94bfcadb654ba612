//! Whole frames: traversal, fetching, and completion across frame boundaries.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use glam::DVec3;
use skyweave_config::TileConfig;
use skyweave_math::Frustum;
use skyweave_tiles::{
    Dataset, DatasetId, FrameStats, GraphicsDevice, HeadlessDevice, HostFetcher, ImagesetLayer,
    LoadOutcome, LoadState, PooledFetcher, RenderContext, TileCache, VisibleRows, file_transport,
    fov_scale_for, run_frame,
};

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 50, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn sky(levels: u32) -> Arc<Dataset> {
    let mut dataset = Dataset::healpix(DatasetId(0), "dss", "Norder{level}/Dir{dir}/Npix{index}{ext}");
    dataset.extensions = "png".to_string();
    dataset.levels = levels;
    Arc::new(dataset)
}

#[test]
fn narrow_view_refines_only_what_it_sees() {
    let mut cache = TileCache::default();
    let layers = [ImagesetLayer::new(&mut cache, sky(2)).unwrap()];
    let mut device = HeadlessDevice::new();
    let fetcher = HostFetcher::new();
    let mut sink = VisibleRows::new();
    let frustum = Frustum::looking_along(DVec3::X, DVec3::Z, 10.0, 1.0, 0.5, 10.0);
    let fov_scale = fov_scale_for(10.0, 100, false);

    let mut stats = FrameStats::default();
    for _ in 0..10 {
        let mut ctx = RenderContext::new(frustum.clone(), fov_scale, &mut device);
        stats = run_frame(&mut cache, &layers, &mut ctx, &fetcher, &mut sink);
        fetcher.complete_all(|_| Ok(png_bytes()));
    }

    assert_eq!(stats.deepest_level, 2);
    assert!(stats.triangles_rendered > 0);
    assert!(!device.take_draw_calls().is_empty());
    assert!(fetcher.call_count() < 12 + 48 + 192);

    // The face behind the camera was never requested.
    let behind = layers[0]
        .roots()
        .iter()
        .copied()
        .find(|&root| cache.is_point_in_tile(root, 0.0, 180.0).unwrap())
        .unwrap();
    assert_eq!(cache.tile(behind).unwrap().state(), LoadState::Unrequested);
}

#[test]
fn duplicate_catalog_requests_share_one_fetch() {
    let mut dataset = Dataset::healpix(DatasetId(5), "gaia", "Norder{level}/Npix{index}.tsv");
    dataset.catalog = true;
    let dataset = Arc::new(dataset);
    let mut cache = TileCache::default();
    let tile = cache.get_tile(0, 2, 2, &dataset, None).unwrap();
    let fetcher = HostFetcher::new();

    let first = cache.subscribe(tile).unwrap();
    cache.request_image(tile).unwrap();
    cache.request_image(tile).unwrap();
    cache.process_queue(&fetcher);
    let second = cache.subscribe(tile).unwrap();
    cache.request_image(tile).unwrap();
    cache.process_queue(&fetcher);
    assert_eq!(fetcher.call_count(), 1);
    assert!(first.try_recv().is_err());

    fetcher.complete_all(|_| Ok(b"ra\tdec\tmag\n10.5\t-3.2\t12\n11.0\t-3.0\t14\n".to_vec()));
    cache.apply_completions();

    assert_eq!(first.try_recv(), Ok(LoadOutcome::Ready));
    assert_eq!(second.try_recv(), Ok(LoadOutcome::Ready));
    assert_eq!(cache.tile(tile).unwrap().rows().len(), 2);
    assert_eq!(fetcher.call_count(), 1);
}

#[test]
fn device_failure_errors_one_tile_and_spares_siblings() {
    let mut cache = TileCache::new(TileConfig {
        max_concurrent_fetches: 12,
        ..TileConfig::default()
    });
    let layers = [ImagesetLayer::new(&mut cache, sky(1)).unwrap()];
    // Room for one mesh and one texture.
    let mut device = HeadlessDevice::with_allocation_budget(2);
    let fetcher = HostFetcher::new();
    let mut sink = VisibleRows::new();

    for _ in 0..2 {
        let mut ctx = RenderContext::new(Frustum::unbounded(), 1.0e9, &mut device);
        run_frame(&mut cache, &layers, &mut ctx, &fetcher, &mut sink);
        fetcher.complete_all(|_| Ok(png_bytes()));
    }

    let stats = cache.stats();
    assert_eq!(stats.tiles_in_view, 1);
    let errored = layers[0]
        .roots()
        .iter()
        .filter(|&&root| cache.tile(root).unwrap().is_errored())
        .count();
    assert_eq!(errored, 11);
    assert_eq!(device.live_meshes(), 1);
    assert_eq!(device.take_draw_calls().len(), 4);
}

#[test]
fn pooled_file_fetcher_feeds_frames() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("mosaic/0")).unwrap();
    std::fs::write(dir.path().join("mosaic/0/0_0.png"), png_bytes()).unwrap();

    let mut present = Dataset::tangent(DatasetId(1), "mosaic", 20.0, "mosaic/{level}/{x}_{y}.png");
    present.levels = 0;
    let mut missing = Dataset::tangent(DatasetId(2), "gone", 20.0, "file://gone/{level}/{x}_{y}.png");
    missing.levels = 0;

    let mut cache = TileCache::default();
    let layers = [
        ImagesetLayer::new(&mut cache, Arc::new(present)).unwrap(),
        ImagesetLayer::new(&mut cache, Arc::new(missing)).unwrap(),
    ];
    let fetcher = PooledFetcher::new(2, file_transport(dir.path())).unwrap();
    let mut device = HeadlessDevice::new();
    let mut sink = VisibleRows::new();

    let (present_root, missing_root) = (layers[0].roots()[0], layers[1].roots()[0]);
    for _ in 0..400 {
        let mut ctx = RenderContext::new(Frustum::unbounded(), 1.0e9, &mut device);
        let stats = run_frame(&mut cache, &layers, &mut ctx, &fetcher, &mut sink);
        if stats.tiles_in_view == 1 && cache.tile(missing_root).unwrap().is_errored() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(cache.tile(present_root).unwrap().is_ready());
    assert!(cache.tile(present_root).unwrap().mesh().is_some());
    assert!(cache.tile(missing_root).unwrap().is_errored());
    assert_eq!(cache.downloading(), 0);
}

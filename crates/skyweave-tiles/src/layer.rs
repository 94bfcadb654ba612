//! A dataset's root tiles and the per-frame driver.

use std::sync::Arc;

use skyweave_config::Projection;

use crate::cache::TileCache;
use crate::catalog::CatalogSink;
use crate::context::{FrameStats, RenderContext};
use crate::dataset::Dataset;
use crate::error::TileError;
use crate::fetch::Fetcher;
use crate::key::TileId;

/// One dataset on screen: its level-0 tiles, drawn in order every frame.
#[derive(Debug)]
pub struct ImagesetLayer {
    dataset: Arc<Dataset>,
    roots: Vec<TileId>,
}

impl ImagesetLayer {
    /// Create the dataset's roots in `cache`: the twelve HEALPix faces, or
    /// the single tangent-plane root.
    pub fn new(cache: &mut TileCache, dataset: Arc<Dataset>) -> Result<Self, TileError> {
        let roots = match dataset.projection {
            Projection::Healpix => {
                let mut roots = Vec::with_capacity(12);
                for x in 0..3 {
                    for y in 0..4 {
                        roots.push(cache.get_tile(0, x, y, &dataset, None)?);
                    }
                }
                roots
            }
            Projection::Tangent => vec![cache.get_tile(0, 0, 0, &dataset, None)?],
        };
        tracing::debug!(dataset = %dataset.name, roots = roots.len(), "layer created");
        Ok(Self { dataset, roots })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn roots(&self) -> &[TileId] {
        &self.roots
    }

    /// Traverse every root inside the frustum. Catalog rows go to `sink`;
    /// rows of roots that left the view are withdrawn.
    pub fn draw(&self, cache: &mut TileCache, ctx: &mut RenderContext<'_>, sink: &mut dyn CatalogSink) {
        for &root in &self.roots {
            let in_view = cache
                .tile(root)
                .is_some_and(|tile| tile.is_in_frustum(&ctx.frustum));
            match (self.dataset.catalog, in_view) {
                (false, true) => {
                    cache.draw(root, ctx);
                }
                (false, false) => {}
                (true, true) => cache.draw_catalog(root, ctx, sink),
                (true, false) => cache.withdraw_catalog_rows(root, sink),
            }
        }
    }
}

/// Run one frame over `layers`.
///
/// Applies fetch completions that arrived since the last frame, purges
/// stale subtrees when `purge_after_frames` is set, draws each layer, then
/// dispatches queued requests.
pub fn run_frame(
    cache: &mut TileCache,
    layers: &[ImagesetLayer],
    ctx: &mut RenderContext<'_>,
    fetcher: &dyn Fetcher,
    sink: &mut dyn CatalogSink,
) -> FrameStats {
    let generation = cache.begin_frame();
    cache.apply_completions();

    let purge_after = cache.config().purge_after_frames;
    if purge_after > 0 && generation > purge_after {
        let report = cache.purge_stale(generation - purge_after, &mut *ctx.device);
        report.withdraw_from(sink);
    }

    for layer in layers {
        layer.draw(cache, ctx, sink);
    }
    let dispatched = cache.process_queue(fetcher);

    let stats = cache.stats();
    tracing::trace!(
        generation,
        dispatched,
        touched = stats.tiles_touched,
        in_view = stats.tiles_in_view,
        triangles = stats.triangles_rendered,
        "frame finished"
    );
    stats
}

//! Recursive level-of-detail traversal.
//!
//! Each quadrant of a tile is drawn either by the tile itself or by the
//! child covering it. A child that cannot draw yet (data still loading)
//! leaves its quadrant to the parent, so coarse imagery fills in until the
//! finer tiles arrive.

use crate::cache::TileCache;
use crate::catalog::CatalogSink;
use crate::context::RenderContext;
use crate::device::DrawCall;
use crate::key::TileId;
use crate::tile::{LoadState, QuadrantVisibility, Tile};

/// How traversal treats a tile given its load state.
enum Readiness {
    Ready,
    /// Errored at a shallow level: skip this level and draw the children.
    ChildrenOnly,
    /// Nothing to do at or below this tile yet.
    Skip,
}

impl TileCache {
    /// Mark a tile as visited this frame and decide how to treat it.
    /// Requests data for tiles that have none yet.
    fn visit(&mut self, id: TileId) -> Readiness {
        let generation = self.generation;
        let shallow = self.config().shallow_error_level;
        let Some(tile) = self.tile_mut(id) else {
            return Readiness::Skip;
        };
        tile.rendered_generation = generation;
        let (state, level) = (tile.state, tile.level());
        self.stats.tiles_touched += 1;

        match state {
            LoadState::Ready => Readiness::Ready,
            LoadState::Errored if level < shallow => Readiness::ChildrenOnly,
            LoadState::Errored => Readiness::Skip,
            LoadState::Unrequested | LoadState::Downloading => {
                if let Err(err) = self.request_image(id) {
                    tracing::debug!(%err, "tile request failed");
                }
                Readiness::Skip
            }
        }
    }

    /// Child in `slot` with its frustum and LOD tests, or `None` at the
    /// deepest level.
    fn child_view(&mut self, id: TileId, slot: usize, ctx: &RenderContext<'_>) -> Option<(TileId, bool, bool)> {
        let child = self.child(id, slot).ok()?;
        let tile = self.tile(child)?;
        Some((
            child,
            tile.is_in_frustum(&ctx.frustum),
            tile.is_big_enough(ctx.fov_scale),
        ))
    }

    fn mark_rendered_at_or_below(&mut self, id: TileId) {
        let generation = self.generation;
        let Some(tile) = self.tile_mut(id) else {
            return;
        };
        tile.rendered_at_or_below_generation = generation;
        if let Some(parent) = tile.parent.and_then(|p| self.tile_mut(p)) {
            parent.rendered_at_or_below_generation = generation;
        }
    }

    /// Draw the subtree under an image tile.
    ///
    /// Returns true when the tile's area is taken care of (drawn here, by
    /// descendants, or nothing to show), false when the caller should draw
    /// the quadrant this tile stands for itself. Catalog tiles draw through
    /// [`TileCache::draw_catalog`] and always return true here.
    pub fn draw(&mut self, id: TileId, ctx: &mut RenderContext<'_>) -> bool {
        if self.tile(id).is_some_and(|t| t.dataset.catalog) {
            return true;
        }
        let only_children = match self.visit(id) {
            Readiness::Ready => false,
            Readiness::ChildrenOnly => true,
            Readiness::Skip => return false,
        };
        let Some(tile) = self.tile(id) else {
            return false;
        };
        let at_deepest = tile.level() >= tile.dataset.deepest_level();

        let mut quadrants = [QuadrantVisibility::default(); 4];
        let mut child_rendered = false;
        for (slot, quadrant) in quadrants.iter_mut().enumerate() {
            if at_deepest {
                *quadrant = QuadrantVisibility {
                    target: true,
                    current: true,
                };
                continue;
            }
            let target = match self.child_view(id, slot, ctx) {
                Some((child, true, big)) if big || only_children => {
                    let needs_parent = !self.draw(child, ctx);
                    child_rendered |= needs_parent;
                    needs_parent
                }
                Some((_, true, _)) => true,
                Some((_, false, _)) => false,
                // The child could not be created; keep the quadrant.
                None => true,
            };
            *quadrant = QuadrantVisibility {
                target,
                current: target,
            };
        }
        let anything_to_render = quadrants.iter().any(|q| q.current);

        if let Some(tile) = self.tile_mut(id) {
            tile.quadrants = quadrants;
        }
        if child_rendered || anything_to_render {
            self.mark_rendered_at_or_below(id);
        }
        if !anything_to_render || only_children {
            return true;
        }
        let Ok(mesh) = self.create_geometry(id, &mut *ctx.device) else {
            return false;
        };

        let Some(tile) = self.tile(id) else {
            return false;
        };
        let (level, texture) = (tile.level(), tile.texture);
        let Some(geometry) = tile.geometry else {
            return false;
        };
        let mut triangles = 0;
        for part in (0..4).filter(|&part| quadrants[part].target) {
            let count = geometry.triangles[part];
            triangles += count;
            ctx.device.draw_part(DrawCall {
                mesh,
                part,
                texture,
                origin: geometry.origin,
                opacity: ctx.opacity,
                index_count: (count * 3) as u32,
            });
        }

        self.stats.tiles_in_view += 1;
        self.stats.triangles_rendered += triangles;
        self.stats.deepest_level = self.stats.deepest_level.max(level);
        true
    }

    /// Stream a catalog subtree's rows into `sink`.
    ///
    /// A tile's rows are visible while any of its children is in view, or
    /// while it is itself a visible leaf. Everything else is withdrawn.
    pub fn draw_catalog(&mut self, id: TileId, ctx: &RenderContext<'_>, sink: &mut dyn CatalogSink) {
        let only_children = match self.visit(id) {
            Readiness::Ready => false,
            Readiness::ChildrenOnly => true,
            Readiness::Skip => return,
        };
        let Some(tile) = self.tile(id) else {
            return;
        };
        let (level, at_deepest) = (tile.level(), tile.level() >= tile.dataset.deepest_level());

        let mut any_child_in_frustum = false;
        if !at_deepest {
            for slot in 0..4 {
                match self.child_view(id, slot, ctx) {
                    Some((child, true, big)) => {
                        any_child_in_frustum = true;
                        if big || only_children {
                            self.draw_catalog(child, ctx, sink);
                        } else {
                            self.withdraw_catalog_rows(child, sink);
                        }
                    }
                    Some((child, false, _)) => self.withdraw_catalog_rows(child, sink),
                    None => {}
                }
            }
        }
        if only_children {
            return;
        }

        if any_child_in_frustum || at_deepest {
            self.show_catalog_rows(id, sink);
            self.mark_rendered_at_or_below(id);
            self.stats.tiles_in_view += 1;
            self.stats.deepest_level = self.stats.deepest_level.max(level);
        } else if let Some(tile) = self.tile_mut(id) {
            hide_rows(tile, sink);
        }
    }

    fn show_catalog_rows(&mut self, id: TileId, sink: &mut dyn CatalogSink) {
        if let Some(tile) = self.tile_mut(id)
            && !tile.rows_visible
        {
            tile.rows_visible = true;
            sink.add_tile_rows(tile.key, &tile.rows);
        }
    }

    /// Withdraw the rows of `id` and every descendant from `sink`.
    pub fn withdraw_catalog_rows(&mut self, id: TileId, sink: &mut dyn CatalogSink) {
        let Some(tile) = self.tile_mut(id) else {
            return;
        };
        hide_rows(tile, sink);
        let children = tile.children;
        for child in children.into_iter().flatten() {
            self.withdraw_catalog_rows(child, sink);
        }
    }

    /// Collect the rows of every catalog tile in view into `sink`,
    /// requesting data that is missing.
    ///
    /// With `limit`, traversal stops at tiles that are not ready. Returns
    /// true when no tile in the visible subtree is still queued or
    /// downloading.
    pub fn get_data_in_view(
        &mut self,
        id: TileId,
        ctx: &RenderContext<'_>,
        limit: bool,
        sink: &mut dyn CatalogSink,
    ) -> bool {
        let shallow = self.config().shallow_error_level;
        let Some(tile) = self.tile(id) else {
            return true;
        };
        let (state, level, at_deepest) = (
            tile.state,
            tile.level(),
            tile.level() >= tile.dataset.deepest_level(),
        );
        match state {
            LoadState::Ready => {}
            LoadState::Errored if level >= shallow => return true,
            LoadState::Errored => {}
            LoadState::Unrequested | LoadState::Downloading => {
                if let Err(err) = self.request_image(id) {
                    tracing::debug!(%err, "tile request failed");
                }
                if limit {
                    return false;
                }
            }
        }

        let mut all_children_ready = true;
        let mut any_child_in_frustum = false;
        if !at_deepest {
            for slot in 0..4 {
                if let Some((child, true, _)) = self.child_view(id, slot, ctx) {
                    any_child_in_frustum = true;
                    let ready = self.get_data_in_view(child, ctx, limit, sink);
                    all_children_ready &= ready;
                }
            }
        }

        let Some(tile) = self.tile(id) else {
            return all_children_ready;
        };
        if (any_child_in_frustum || at_deepest) && tile.is_ready() {
            sink.add_tile_rows(tile.key, &tile.rows);
        }
        all_children_ready && !tile.is_pending()
    }
}

fn hide_rows(tile: &mut Tile, sink: &mut dyn CatalogSink) {
    if tile.rows_visible {
        tile.rows_visible = false;
        sink.remove_tile_rows(tile.key, &tile.rows);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::DVec4;
    use skyweave_config::TileConfig;
    use skyweave_math::Frustum;

    use super::*;
    use crate::cache::tests::png_bytes;
    use crate::catalog::VisibleRows;
    use crate::dataset::{Dataset, DatasetId};
    use crate::device::{GraphicsDevice, HeadlessDevice};
    use crate::error::FetchError;
    use crate::fetch::HostFetcher;

    const COARSE: f64 = 1.0e9;
    const FINE: f64 = 1.0;

    fn sky(levels: u32) -> Arc<Dataset> {
        let mut dataset = Dataset::healpix(DatasetId(0), "dss", "Norder{level}/Npix{index}{ext}");
        dataset.levels = levels;
        Arc::new(dataset)
    }

    fn catalog() -> Arc<Dataset> {
        let mut dataset = Dataset::healpix(DatasetId(3), "gaia", "Norder{level}/Npix{index}.tsv");
        dataset.catalog = true;
        dataset.levels = 1;
        Arc::new(dataset)
    }

    fn nothing_visible() -> Frustum {
        Frustum::from_planes([DVec4::new(0.0, 0.0, 0.0, -10.0); 6])
    }

    fn settle(cache: &mut TileCache, fetcher: &HostFetcher, body: &[u8]) {
        cache.process_queue(fetcher);
        fetcher.complete_all(|_| Ok(body.to_vec()));
        cache.apply_completions();
    }

    fn frame(cache: &mut TileCache, root: TileId, device: &mut HeadlessDevice, fov_scale: f64) -> bool {
        cache.begin_frame();
        let mut ctx = RenderContext::new(Frustum::unbounded(), fov_scale, device);
        cache.draw(root, &mut ctx)
    }

    #[test]
    fn test_unready_tile_requests_and_draws_nothing() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &sky(3), None).unwrap();
        let mut device = HeadlessDevice::new();
        assert!(!frame(&mut cache, root, &mut device, COARSE));
        assert_eq!(cache.queue_len(), 1);
        assert!(device.take_draw_calls().is_empty());
        assert_eq!(device.meshes_created, 0);
    }

    #[test]
    fn test_coarse_view_draws_root_quadrants() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &sky(3), None).unwrap();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        frame(&mut cache, root, &mut device, COARSE);
        settle(&mut cache, &fetcher, &png_bytes());

        assert!(frame(&mut cache, root, &mut device, COARSE));
        let calls = device.take_draw_calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.texture.is_some() && c.index_count == 384));
        let stats = cache.stats();
        assert_eq!(stats.tiles_in_view, 1);
        assert_eq!(stats.triangles_rendered, 512);
        // Children exist but were not big enough to visit.
        assert!(cache.tile(root).unwrap().children().iter().all(Option::is_some));
        assert_eq!(stats.tiles_touched, 1);
    }

    #[test]
    fn test_visited_flag_tracks_current_frame() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &sky(3), None).unwrap();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        assert!(!cache.visited_this_frame(root));

        frame(&mut cache, root, &mut device, COARSE);
        assert!(cache.visited_this_frame(root));
        settle(&mut cache, &fetcher, &png_bytes());
        frame(&mut cache, root, &mut device, COARSE);
        let child = cache.tile(root).unwrap().children()[0].unwrap();
        assert!(!cache.visited_this_frame(child));

        cache.begin_frame();
        assert!(!cache.visited_this_frame(root));
    }

    #[test]
    fn test_parent_covers_until_children_ready() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &sky(1), None).unwrap();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        frame(&mut cache, root, &mut device, FINE);
        settle(&mut cache, &fetcher, &png_bytes());

        // Children are visited and queued; the root fills in.
        assert!(frame(&mut cache, root, &mut device, FINE));
        assert_eq!(device.take_draw_calls().len(), 4);
        assert_eq!(cache.queue_len(), 4);
        assert!((0..4).all(|slot| cache.tile(root).unwrap().quadrant(slot).target));

        settle(&mut cache, &fetcher, &png_bytes());
        assert!(frame(&mut cache, root, &mut device, FINE));
        let calls = device.take_draw_calls();
        // Four leaf children, four quadrants each; nothing from the root.
        assert_eq!(calls.len(), 16);
        let root_mesh = cache.tile(root).unwrap().mesh();
        assert!(calls.iter().all(|c| Some(c.mesh) != root_mesh));
        assert!((0..4).all(|slot| !cache.tile(root).unwrap().quadrant(slot).target));
        assert_eq!(cache.stats().deepest_level, 1);
        assert_eq!(
            cache.tile(root).unwrap().rendered_at_or_below_generation(),
            cache.generation()
        );
    }

    #[test]
    fn test_shallow_error_draws_children_only() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &sky(3), None).unwrap();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        frame(&mut cache, root, &mut device, COARSE);
        cache.process_queue(&fetcher);
        fetcher.complete_all(|url| {
            Err(FetchError::NotFound {
                url: url.to_string(),
            })
        });
        cache.apply_completions();
        assert!(cache.tile(root).unwrap().is_errored());

        // Even at a coarse scale the children are visited.
        assert!(frame(&mut cache, root, &mut device, COARSE));
        assert_eq!(cache.queue_len(), 4);
        assert!(cache.tile(root).unwrap().mesh().is_none());
        assert!(device.take_draw_calls().is_empty());
    }

    #[test]
    fn test_deep_error_is_a_dead_end() {
        let mut cache = TileCache::new(TileConfig {
            shallow_error_level: 0,
            ..TileConfig::default()
        });
        let root = cache.get_tile(0, 0, 0, &sky(3), None).unwrap();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        frame(&mut cache, root, &mut device, COARSE);
        cache.process_queue(&fetcher);
        fetcher.complete_all(|_| Ok(b"garbage".to_vec()));
        cache.apply_completions();

        assert!(!frame(&mut cache, root, &mut device, COARSE));
        assert_eq!(cache.queue_len(), 0);
        assert!(cache.tile(root).unwrap().children().iter().all(Option::is_none));
    }

    #[test]
    fn test_out_of_view_children_are_not_drawn() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &sky(3), None).unwrap();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        frame(&mut cache, root, &mut device, COARSE);
        settle(&mut cache, &fetcher, &png_bytes());

        cache.begin_frame();
        let mut ctx = RenderContext::new(nothing_visible(), COARSE, &mut device);
        assert!(cache.draw(root, &mut ctx));
        assert!(device.take_draw_calls().is_empty());
        assert_eq!(device.meshes_created, 0);
    }

    #[test]
    fn test_catalog_rows_follow_view() {
        let body = b"ra\tdec\n1\t2\n3\t4\n";
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 1, 0, &catalog(), None).unwrap();
        let mut sink = VisibleRows::new();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();

        let ctx = RenderContext::new(Frustum::unbounded(), COARSE, &mut device);
        cache.draw_catalog(root, &ctx, &mut sink);
        settle(&mut cache, &fetcher, body);
        cache.draw_catalog(root, &ctx, &mut sink);
        let key = cache.tile(root).unwrap().key();
        assert!(sink.contains_tile(&key));
        assert_eq!(sink.row_count(), 2);

        // Idempotent while in view.
        let version = sink.version();
        cache.draw_catalog(root, &ctx, &mut sink);
        assert_eq!(sink.version(), version);

        let hidden = RenderContext::new(nothing_visible(), COARSE, ctx.device);
        cache.draw_catalog(root, &hidden, &mut sink);
        assert!(!sink.contains_tile(&key));
        assert_eq!(sink.row_count(), 0);
        assert!(!cache.tile(root).unwrap().rows_visible());
    }

    #[test]
    fn test_catalog_leaves_show_their_rows() {
        let body = b"ra\tdec\n1\t2\n";
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 1, 0, &catalog(), None).unwrap();
        let mut sink = VisibleRows::new();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        let ctx = RenderContext::new(Frustum::unbounded(), FINE, &mut device);

        cache.draw_catalog(root, &ctx, &mut sink);
        settle(&mut cache, &fetcher, body);
        cache.draw_catalog(root, &ctx, &mut sink);
        settle(&mut cache, &fetcher, body);
        cache.draw_catalog(root, &ctx, &mut sink);

        // Root plus its four level-1 leaves.
        assert_eq!(sink.tile_count(), 5);
        assert_eq!(sink.row_count(), 5);
        assert_eq!(fetcher.call_count(), 5);
    }

    #[test]
    fn test_get_data_in_view() {
        let body = b"ra\tdec\n1\t2\n";
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 1, 0, &catalog(), None).unwrap();
        let mut sink = VisibleRows::new();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        let ctx = RenderContext::new(Frustum::unbounded(), COARSE, &mut device);

        assert!(!cache.get_data_in_view(root, &ctx, true, &mut sink));
        assert_eq!(cache.queue_len(), 1);
        settle(&mut cache, &fetcher, body);

        // Root ready; children now requested.
        assert!(!cache.get_data_in_view(root, &ctx, false, &mut sink));
        assert_eq!(cache.queue_len(), 4);
        settle(&mut cache, &fetcher, body);

        assert!(cache.get_data_in_view(root, &ctx, false, &mut sink));
        assert_eq!(sink.tile_count(), 5);
    }

    #[test]
    fn test_withdraw_recurses() {
        let body = b"ra\tdec\n1\t2\n";
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 1, 0, &catalog(), None).unwrap();
        let mut sink = VisibleRows::new();
        let mut device = HeadlessDevice::new();
        let fetcher = HostFetcher::new();
        let ctx = RenderContext::new(Frustum::unbounded(), FINE, &mut device);
        for _ in 0..3 {
            cache.draw_catalog(root, &ctx, &mut sink);
            settle(&mut cache, &fetcher, body);
        }
        cache.draw_catalog(root, &ctx, &mut sink);
        assert_eq!(sink.tile_count(), 5);

        cache.withdraw_catalog_rows(root, &mut sink);
        assert_eq!(sink.tile_count(), 0);
    }

    #[test]
    fn test_catalog_tiles_skip_image_draw() {
        let mut cache = TileCache::default();
        let root = cache.get_tile(0, 0, 0, &catalog(), None).unwrap();
        let mut device = HeadlessDevice::new();
        let mut ctx = RenderContext::new(Frustum::unbounded(), COARSE, &mut device);
        assert!(cache.draw(root, &mut ctx));
        assert_eq!(cache.queue_len(), 0);
        assert!(device.take_draw_calls().is_empty());
    }
}

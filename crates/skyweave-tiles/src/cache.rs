//! The tile arena: canonical tile instances, the request queue, and fetch
//! completion handling.
//!
//! Everything here runs on the render thread. Fetchers report back over a
//! channel that [`TileCache::apply_completions`] drains once per frame, so
//! readiness flags only ever change between traversals.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use rustc_hash::FxHashMap;
use skyweave_config::{Projection, TileConfig};

use crate::catalog::{CatalogRow, CatalogSink};
use crate::context::FrameStats;
use crate::dataset::{Dataset, DatasetId, PayloadKind};
use crate::device::{GraphicsDevice, MeshHandle, TextureHandle};
use crate::error::{DeviceError, TileError};
use crate::fetch::{FetchCompletion, FetchRequest, FetchTicket, Fetcher};
use crate::healpix_tile::HealpixShape;
use crate::key::{TileId, TileKey, child_slot, slot_quadrant};
use crate::payload::{Payload, TextureData, decode_payload};
use crate::tangent_tile::TangentShape;
use crate::tessellation::{Tessellation, TileMesh};
use crate::tile::{Geometry, LoadState, Tile};

/// How a tile's load finished, as seen by [`TileCache::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready,
    Errored,
    /// The tile was removed from the cache before its load finished.
    Purged,
}

/// Result of removing tiles from the cache.
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub tiles_removed: usize,
    /// Rows of removed catalog tiles that were still visible.
    pub withdrawn_rows: Vec<(TileKey, Arc<[CatalogRow]>)>,
}

impl PurgeReport {
    /// Withdraw every still-visible row set from `sink`.
    pub fn withdraw_from(&self, sink: &mut dyn CatalogSink) {
        for (key, rows) in &self.withdrawn_rows {
            sink.remove_tile_rows(*key, rows);
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    tile: Option<Tile>,
}

/// Registry of every tile instance, keyed by [`TileKey`].
///
/// One canonical tile exists per key, so identical data is never requested
/// twice. Entries persist until an explicit purge.
pub struct TileCache {
    config: TileConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    index: FxHashMap<TileKey, TileId>,

    queue: Vec<TileId>,
    downloading: usize,
    next_ticket: u64,
    tickets: FxHashMap<FetchTicket, (TileId, PayloadKind)>,
    done_tx: Sender<FetchCompletion>,
    done_rx: Receiver<FetchCompletion>,
    waiters: FxHashMap<TileId, Vec<Sender<LoadOutcome>>>,

    pub(crate) generation: u64,
    pub(crate) last_deepest_level: u32,
    pub(crate) stats: FrameStats,
}

impl TileCache {
    pub fn new(config: TileConfig) -> Self {
        let (done_tx, done_rx) = unbounded();
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            queue: Vec::new(),
            downloading: 0,
            next_ticket: 0,
            tickets: FxHashMap::default(),
            done_tx,
            done_rx,
            waiters: FxHashMap::default(),
            generation: 0,
            last_deepest_level: 0,
            stats: FrameStats::default(),
        }
    }

    pub fn config(&self) -> &TileConfig {
        &self.config
    }

    /// Current render generation; advanced by [`TileCache::begin_frame`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Statistics of the frame in progress (or the last one).
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Deepest level drawn in the previous frame.
    pub fn last_deepest_level(&self) -> u32 {
        self.last_deepest_level
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Tiles waiting to be dispatched.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Tiles with fetches in flight.
    pub fn downloading(&self) -> usize {
        self.downloading
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.tile.as_ref())
    }

    /// Whether traversal reached `id` in the current generation.
    pub fn visited_this_frame(&self, id: TileId) -> bool {
        self.generation > 0
            && self
                .tile(id)
                .is_some_and(|tile| tile.rendered_generation == self.generation)
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.tile.as_mut())
    }

    pub(crate) fn get(&self, id: TileId) -> Result<&Tile, TileError> {
        self.tile(id).ok_or(TileError::UnknownTile(id))
    }

    pub(crate) fn get_mut(&mut self, id: TileId) -> Result<&mut Tile, TileError> {
        self.tile_mut(id).ok_or(TileError::UnknownTile(id))
    }

    /// Handle of the tile with `key`, if it is cached.
    pub fn lookup(&self, key: &TileKey) -> Option<TileId> {
        self.index.get(key).copied().filter(|&id| self.tile(id).is_some())
    }

    /// Every live tile.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, &Tile)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.tile.as_ref().map(|tile| {
                let id = TileId {
                    index: index as u32,
                    generation: slot.generation,
                };
                (id, tile)
            })
        })
    }

    /// Return the canonical tile at `(level, x, y)`, creating it if needed.
    ///
    /// Roots (`parent == None`) must be at level 0: HEALPix roots take
    /// `x < 3, y < 4`, the tangent root is `(0, 0)`. Other tiles need the
    /// parent one level up, and `(x, y)` must be one of its four children.
    /// New tiles compute their corners and bounding sphere immediately.
    pub fn get_tile(
        &mut self,
        level: u32,
        x: u32,
        y: u32,
        dataset: &Arc<Dataset>,
        parent: Option<TileId>,
    ) -> Result<TileId, TileError> {
        let invalid = |reason: &'static str| TileError::InvalidAddress {
            level,
            x,
            y,
            reason,
        };
        if level > dataset.deepest_level() {
            return Err(invalid("deeper than the dataset"));
        }

        let (shape, link): (Box<dyn Tessellation>, _) = match parent {
            None => (root_shape(dataset, level, x, y)?, None),
            Some(parent_id) => {
                let parent = self.get(parent_id)?;
                if parent.level() + 1 != level || parent.key.dataset != dataset.id {
                    return Err(invalid("not a child of the given parent"));
                }
                let (x1, y1) = (x % 2, y % 2);
                let shape = parent.shape.child(x1, y1);
                if shape.address() != (x, y) {
                    return Err(invalid("not a child of the given parent"));
                }
                (shape, Some((parent_id, child_slot(x1, y1))))
            }
        };
        Ok(self.get_or_insert(shape, dataset, link))
    }

    /// Child of `id` in `slot` (`0..4`), created and linked on first use.
    pub fn child(&mut self, id: TileId, slot: usize) -> Result<TileId, TileError> {
        let tile = self.get(id)?;
        if slot >= 4 {
            let (x, y) = tile.shape.address();
            return Err(TileError::InvalidAddress {
                level: tile.level(),
                x,
                y,
                reason: "child slot out of range",
            });
        }
        if let Some(child) = tile.children[slot].filter(|&c| self.tile(c).is_some()) {
            return Ok(child);
        }
        if tile.level() >= tile.dataset.deepest_level() {
            let (x, y) = tile.shape.address();
            return Err(TileError::InvalidAddress {
                level: tile.level(),
                x,
                y,
                reason: "tile is at the deepest level",
            });
        }
        let (x1, y1) = slot_quadrant(slot);
        let shape = tile.shape.child(x1, y1);
        let dataset = Arc::clone(&tile.dataset);
        Ok(self.get_or_insert(shape, &dataset, Some((id, slot))))
    }

    fn get_or_insert(
        &mut self,
        shape: Box<dyn Tessellation>,
        dataset: &Arc<Dataset>,
        link: Option<(TileId, usize)>,
    ) -> TileId {
        let key = TileKey::new(dataset.id, shape.level(), shape.coord());
        let id = match self.lookup(&key) {
            Some(id) => id,
            None => {
                let tile = Tile::new(
                    key,
                    Arc::clone(dataset),
                    shape,
                    link.map(|(parent, _)| parent),
                    self.generation,
                );
                let id = self.insert(tile);
                self.index.insert(key, id);
                id
            }
        };
        if let Some((parent, slot)) = link {
            if let Some(tile) = self.tile_mut(id) {
                tile.parent = Some(parent);
            }
            if let Some(parent) = self.tile_mut(parent) {
                parent.children[slot] = Some(id);
            }
        }
        id
    }

    fn insert(&mut self, tile: Tile) -> TileId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.tile = Some(tile);
                TileId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    tile: Some(tile),
                });
                TileId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    /// Queue a tile whose data has not been requested yet.
    ///
    /// Re-queueing an already queued tile only refreshes its recency.
    pub fn add_tile_to_queue(&mut self, id: TileId) -> Result<(), TileError> {
        let generation = self.generation;
        let tile = self.get_mut(id)?;
        if tile.state != LoadState::Unrequested {
            return Ok(());
        }
        tile.requested_generation = generation;
        if !tile.queued {
            tile.queued = true;
            tracing::trace!(key = %tile.key, "tile enqueued");
            self.queue.push(id);
        }
        Ok(())
    }

    /// Start acquiring a tile's data. Idempotent while a request is queued
    /// or in flight.
    ///
    /// Tiles of a dataset with a preloaded image become ready immediately.
    pub fn request_image(&mut self, id: TileId) -> Result<(), TileError> {
        let tile = self.get_mut(id)?;
        if tile.state != LoadState::Unrequested {
            return Ok(());
        }
        if let Some(image) = tile.dataset.preloaded.clone() {
            tile.image = Some(image);
            tile.payload_ready = true;
            tile.elevation_ready = true;
            tile.state = LoadState::Ready;
            self.notify(id, LoadOutcome::Ready);
            return Ok(());
        }
        self.add_tile_to_queue(id)
    }

    /// Dispatch queued tiles while fewer than `max_concurrent_fetches` are
    /// downloading. Shallow tiles go first, then the most recently requested.
    pub fn process_queue(&mut self, fetcher: &dyn Fetcher) -> usize {
        let mut dispatched = 0;
        while self.downloading < self.config.max_concurrent_fetches.max(1) {
            let Some(pos) = self.next_in_queue() else {
                break;
            };
            let id = self.queue.swap_remove(pos);
            if self.dispatch(id, fetcher) {
                dispatched += 1;
            }
        }
        dispatched
    }

    fn next_in_queue(&self) -> Option<usize> {
        self.queue
            .iter()
            .enumerate()
            .filter_map(|(pos, &id)| self.tile(id).map(|tile| (pos, tile)))
            .min_by_key(|(_, tile)| (tile.level(), std::cmp::Reverse(tile.requested_generation)))
            .map(|(pos, _)| pos)
    }

    fn dispatch(&mut self, id: TileId, fetcher: &dyn Fetcher) -> bool {
        let Some(tile) = self.tile_mut(id) else {
            return false;
        };
        tile.queued = false;
        if tile.state != LoadState::Unrequested {
            return false;
        }
        tile.state = LoadState::Downloading;
        tile.payload_ready = false;
        tile.fetch_failed = false;
        tile.elevation_ready = !tile.dataset.has_elevation();

        let mut requests = vec![(tile.url(), tile.dataset.payload_kind())];
        if let Some(url) = tile.elevation_url() {
            requests.push((url, PayloadKind::Elevation));
        }
        tile.outstanding_fetches = requests.len() as u8;
        tracing::trace!(key = %tile.key, url = %requests[0].0, "tile dispatched");

        self.downloading += 1;
        for (url, kind) in requests {
            let ticket = FetchTicket(self.next_ticket);
            self.next_ticket += 1;
            self.tickets.insert(ticket, (id, kind));
            fetcher.fetch(FetchRequest { ticket, url }, &self.done_tx);
        }
        true
    }

    /// Apply every completion that has arrived since the last call.
    pub fn apply_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.done_rx.try_recv() {
            if self.apply_completion(completion) {
                applied += 1;
            }
        }
        applied
    }

    fn apply_completion(&mut self, completion: FetchCompletion) -> bool {
        let Some((id, kind)) = self.tickets.remove(&completion.ticket) else {
            return false;
        };
        let Some(tile) = self.tile_mut(id) else {
            return false;
        };

        match completion.result {
            Ok(bytes) => match decode_payload(kind, &bytes, tile.dataset.delimiter) {
                Ok(Payload::Texture(data)) => {
                    tile.image = Some(Arc::new(data));
                    tile.payload_ready = true;
                }
                Ok(Payload::Rows(rows)) => {
                    tile.rows = Arc::from(rows);
                    tile.payload_ready = true;
                }
                Ok(Payload::Elevation(grid)) => {
                    tile.elevation = Some(grid);
                    tile.elevation_ready = true;
                }
                Err(err) => {
                    tracing::warn!(key = %tile.key, %err, "tile payload decode failed");
                    tile.fetch_failed = true;
                }
            },
            Err(err) => {
                tracing::debug!(key = %tile.key, %err, "tile fetch failed");
                tile.fetch_failed = true;
            }
        }

        tile.outstanding_fetches = tile.outstanding_fetches.saturating_sub(1);
        if tile.outstanding_fetches == 0 {
            let success = !tile.fetch_failed && tile.data_complete();
            let key = tile.key;
            self.remove_from_queue(key, success);
        }
        true
    }

    /// Dequeue the tile with `key` and record the outcome of its load.
    /// Resolves every subscriber.
    pub fn remove_from_queue(&mut self, key: TileKey, success: bool) {
        let Some(id) = self.lookup(&key) else {
            return;
        };
        self.queue.retain(|&queued| queued != id);
        let Some(tile) = self.tile_mut(id) else {
            return;
        };
        let was_downloading = tile.state == LoadState::Downloading;
        tile.queued = false;
        tile.outstanding_fetches = 0;
        let outcome = if success {
            tile.state = LoadState::Ready;
            LoadOutcome::Ready
        } else {
            tile.state = LoadState::Errored;
            LoadOutcome::Errored
        };
        tracing::trace!(%key, success, "tile load finished");

        if was_downloading {
            self.downloading = self.downloading.saturating_sub(1);
        }
        self.notify(id, outcome);
    }

    /// Receiver resolved once when the tile's load finishes, or
    /// immediately if it already has.
    pub fn subscribe(&mut self, id: TileId) -> Result<Receiver<LoadOutcome>, TileError> {
        let (tx, rx) = bounded(1);
        let state = self.get(id)?.state;
        match state {
            LoadState::Ready => {
                let _ = tx.send(LoadOutcome::Ready);
            }
            LoadState::Errored => {
                let _ = tx.send(LoadOutcome::Errored);
            }
            LoadState::Unrequested | LoadState::Downloading => {
                self.waiters.entry(id).or_default().push(tx);
            }
        }
        Ok(rx)
    }

    fn notify(&mut self, id: TileId, outcome: LoadOutcome) {
        for waiter in self.waiters.remove(&id).unwrap_or_default() {
            let _ = waiter.send(outcome);
        }
    }

    /// Build device buffers for a tile, once. Returns immediately when they
    /// already exist.
    ///
    /// A device failure marks the tile errored.
    pub fn create_geometry(
        &mut self,
        id: TileId,
        device: &mut dyn GraphicsDevice,
    ) -> Result<MeshHandle, TileError> {
        let tile = self.get_mut(id)?;
        if let Some(geometry) = tile.geometry {
            return Ok(geometry.mesh);
        }

        let label = tile.key.to_string();
        let mesh = tile.shape.sample_vertices(&tile.dataset);
        match upload(device, &label, &mesh, tile.image.as_deref()) {
            Ok((handle, texture)) => {
                tile.geometry = Some(Geometry {
                    mesh: handle,
                    origin: mesh.origin,
                    triangles: std::array::from_fn(|part| mesh.triangle_count(part)),
                });
                tile.texture = texture;
                Ok(handle)
            }
            Err(err) => {
                tracing::warn!(key = %tile.key, %err, "tile geometry build failed");
                tile.state = LoadState::Errored;
                Err(err.into())
            }
        }
    }

    /// Release a tile's device resources and optionally detach it from its
    /// parent. The tile stays cached and keeps its data.
    pub fn clean_up(
        &mut self,
        id: TileId,
        remove_from_parent: bool,
        device: &mut dyn GraphicsDevice,
    ) -> Result<(), TileError> {
        let tile = self.get_mut(id)?;
        release(tile, device);
        let parent = if remove_from_parent {
            tile.parent.take()
        } else {
            None
        };
        if let Some(parent) = parent.and_then(|p| self.tile_mut(p)) {
            unlink_child(parent, id);
        }
        Ok(())
    }

    /// Advance the render generation and reset frame statistics.
    pub fn begin_frame(&mut self) -> u64 {
        self.generation += 1;
        self.last_deepest_level = self.stats.deepest_level;
        self.stats = FrameStats::default();
        self.generation
    }

    /// Remove non-root tiles neither visited nor rendered (at or below)
    /// since `older_than`. Tiles with a load queued or in flight are kept,
    /// and so are errored tiles traversal still reaches.
    pub fn purge_stale(&mut self, older_than: u64, device: &mut dyn GraphicsDevice) -> PurgeReport {
        let stale: Vec<TileId> = self
            .iter()
            .filter(|(_, tile)| {
                tile.level() > 0 && !tile.is_pending() && tile.last_used_generation() < older_than
            })
            .map(|(id, _)| id)
            .collect();
        let report = self.remove_all(stale, device);
        tracing::debug!(removed = report.tiles_removed, older_than, "purged stale tiles");
        report
    }

    /// Remove every tile of one dataset.
    pub fn clear_dataset(&mut self, dataset: DatasetId, device: &mut dyn GraphicsDevice) -> PurgeReport {
        let ids: Vec<TileId> = self
            .iter()
            .filter(|(_, tile)| tile.key.dataset == dataset)
            .map(|(id, _)| id)
            .collect();
        let report = self.remove_all(ids, device);
        tracing::debug!(removed = report.tiles_removed, dataset = dataset.0, "cleared dataset tiles");
        report
    }

    /// Remove every tile.
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) -> PurgeReport {
        let ids: Vec<TileId> = self.iter().map(|(id, _)| id).collect();
        let report = self.remove_all(ids, device);
        tracing::debug!(removed = report.tiles_removed, "cleared tile cache");
        report
    }

    fn remove_all(&mut self, ids: Vec<TileId>, device: &mut dyn GraphicsDevice) -> PurgeReport {
        let mut report = PurgeReport::default();
        for id in ids {
            self.remove_tile(id, device, &mut report);
        }
        report
    }

    fn remove_tile(&mut self, id: TileId, device: &mut dyn GraphicsDevice, report: &mut PurgeReport) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        let Some(mut tile) = slot.tile.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        if self.index.get(&tile.key) == Some(&id) {
            self.index.remove(&tile.key);
        }
        self.queue.retain(|&queued| queued != id);
        self.tickets.retain(|_, (owner, _)| *owner != id);
        if tile.state == LoadState::Downloading {
            self.downloading = self.downloading.saturating_sub(1);
        }
        self.notify(id, LoadOutcome::Purged);

        release(&mut tile, device);
        if tile.rows_visible {
            report.withdrawn_rows.push((tile.key, Arc::clone(&tile.rows)));
        }
        if let Some(parent) = tile.parent.and_then(|p| self.tile_mut(p)) {
            unlink_child(parent, id);
        }
        report.tiles_removed += 1;
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(TileConfig::default())
    }
}

fn root_shape(dataset: &Dataset, level: u32, x: u32, y: u32) -> Result<Box<dyn Tessellation>, TileError> {
    let invalid = |reason: &'static str| TileError::InvalidAddress {
        level,
        x,
        y,
        reason,
    };
    if level != 0 {
        return Err(invalid("only level-0 tiles may omit the parent"));
    }
    match dataset.projection {
        Projection::Healpix => Ok(Box::new(HealpixShape::root(x, y)?)),
        Projection::Tangent if x == 0 && y == 0 => Ok(Box::new(TangentShape::new(0, 0, 0))),
        Projection::Tangent => Err(invalid("the tangent root is (0, 0)")),
    }
}

fn upload(
    device: &mut dyn GraphicsDevice,
    label: &str,
    mesh: &TileMesh,
    image: Option<&TextureData>,
) -> Result<(MeshHandle, Option<TextureHandle>), DeviceError> {
    let handle = device.create_mesh(label, mesh)?;
    let Some(data) = image else {
        return Ok((handle, None));
    };
    match device.create_texture(label, data) {
        Ok(texture) => Ok((handle, Some(texture))),
        Err(err) => {
            device.release_mesh(handle);
            Err(err)
        }
    }
}

fn release(tile: &mut Tile, device: &mut dyn GraphicsDevice) {
    if let Some(geometry) = tile.geometry.take() {
        device.release_mesh(geometry.mesh);
    }
    if let Some(texture) = tile.texture.take() {
        device.release_texture(texture);
    }
}

fn unlink_child(parent: &mut Tile, child: TileId) {
    for slot in parent.children.iter_mut().filter(|slot| **slot == Some(child)) {
        *slot = None;
    }
}

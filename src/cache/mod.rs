//! Byte-budgeted tile cache that swaps instead of discarding
//!
//! Tiles of any number of owning images share one memory budget. When an
//! insertion pushes resident bytes above the capacity, the least recently
//! used tiles are written to a [`SwapSpace`] until usage is back at the
//! low-water mark (`capacity * threshold`). A swapped tile is restored
//! transparently by [`SwappingTileCache::get`].

pub mod diagnostics;
mod lru;
pub mod memory_tile;
pub mod owners;

pub use diagnostics::CacheAction;
pub use memory_tile::{MemoryTile, TileData};
pub use owners::OwnerRegistry;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};
use crate::error::{Error, Result};
use crate::swap::SwapSpace;
use crate::types::{OwnerId, TileGrid, TileKey};
use self::lru::{TileIndex, TileState};

/// Default memory capacity (16 MiB)
pub const DEFAULT_MEMORY_CAPACITY: u64 = 16 * 1024 * 1024;

/// Default fraction of the capacity kept after an eviction pass
pub const DEFAULT_MEMORY_THRESHOLD: f32 = 0.75;

/// Mutable cache state, guarded by one lock
struct CacheState {
    index: TileIndex,
    memory_capacity: u64,
    memory_threshold: f32,
    hits: u64,
    misses: u64,
    swap_ins: u64,
    swap_outs: u64,
    failed_swap_outs: u64,
}

impl CacheState {
    /// Resident bytes an eviction pass brings usage down to
    ///
    /// Multiplied in `f32`: widening the threshold first lands one byte
    /// short for values like 0.7.
    fn low_water_mark(&self) -> u64 {
        (self.memory_capacity as f32 * self.memory_threshold).floor() as u64
    }

    /// A tile that would overflow the cache while being larger than the
    /// low-water mark would only be evicted again right away.
    fn is_oversized(&self, size: u64) -> bool {
        self.index.memory_used() + size > self.memory_capacity && size > self.low_water_mark()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of resident tiles
    pub tile_count: usize,
    /// Number of tiles held only by the swap space
    pub swapped_count: usize,
    /// Bytes used by resident tiles
    pub memory_used: u64,
    /// Memory capacity in bytes
    pub memory_capacity: u64,
    /// Fraction of the capacity kept after an eviction pass
    pub memory_threshold: f32,
    /// Lookups answered from memory
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Tiles restored from the swap space
    pub swap_ins: u64,
    /// Tiles written to the swap space
    pub swap_outs: u64,
    /// Stores the swap space refused
    pub failed_swap_outs: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from memory (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.swap_ins + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of the capacity in use (0.0 to 1.0, above 1.0 when degraded)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_capacity == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_capacity as f64
        }
    }
}

/// Tile cache that swaps least recently used tiles out instead of dropping them
///
/// Owners are identified by their `Arc` allocation, so two images that
/// compare equal by value still never share tiles.
///
/// Every operation runs under one internal lock, including the calls into
/// the swap space it triggers. No background thread is involved.
pub struct SwappingTileCache<O: ?Sized> {
    state: Mutex<CacheState>,
    owners: OwnerRegistry<O>,
    swap_space: Arc<dyn SwapSpace>,
    diagnostics: AtomicBool,
}

impl<O: ?Sized + Send + Sync> SwappingTileCache<O> {
    /// Creates a cache with the default memory threshold
    ///
    /// # Arguments
    /// * `memory_capacity` - Maximum resident bytes
    /// * `swap_space` - Where evicted tiles go
    pub fn new(memory_capacity: u64, swap_space: Arc<dyn SwapSpace>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                index: TileIndex::new(),
                memory_capacity,
                memory_threshold: DEFAULT_MEMORY_THRESHOLD,
                hits: 0,
                misses: 0,
                swap_ins: 0,
                swap_outs: 0,
                failed_swap_outs: 0,
            }),
            owners: OwnerRegistry::new(),
            swap_space,
            diagnostics: AtomicBool::new(false),
        }
    }

    /// Creates a cache with an explicit memory threshold
    ///
    /// # Arguments
    /// * `memory_capacity` - Maximum resident bytes
    /// * `memory_threshold` - Fraction of the capacity kept after eviction, `0.0..=1.0`
    /// * `swap_space` - Where evicted tiles go
    pub fn with_threshold(
        memory_capacity: u64,
        memory_threshold: f32,
        swap_space: Arc<dyn SwapSpace>,
    ) -> Result<Self> {
        check_threshold(memory_threshold)?;
        let cache = Self::new(memory_capacity, swap_space);
        cache.state.lock().memory_threshold = memory_threshold;
        Ok(cache)
    }

    /// Returns the swap space evicted tiles are written to
    pub fn swap_space(&self) -> &Arc<dyn SwapSpace> {
        &self.swap_space
    }

    /// Returns the id the owner is known under, if any
    pub fn owner_id(&self, owner: &Arc<O>) -> Option<OwnerId> {
        self.owners.lookup(owner)
    }

    /// Adds or replaces a tile and marks it most recently used
    ///
    /// If resident bytes then exceed the capacity, least recently used tiles
    /// are swapped out until usage is at the low-water mark. The tile just
    /// added is never chosen.
    pub fn add(&self, owner: &Arc<O>, x: u32, y: u32, data: Vec<u8>) {
        let key = TileKey::new(self.owners.id_of(owner), x, y);
        let mut state = self.state.lock();
        self.add_locked(&mut state, key, Arc::new(data));
    }

    /// Adds several tiles of one owner under a single lock acquisition
    pub fn add_tiles<I>(&self, owner: &Arc<O>, tiles: I)
    where
        I: IntoIterator<Item = (u32, u32, Vec<u8>)>,
    {
        let owner_id = self.owners.id_of(owner);
        let mut state = self.state.lock();
        for (x, y, data) in tiles {
            self.add_locked(&mut state, TileKey::new(owner_id, x, y), Arc::new(data));
        }
    }

    /// Returns a tile from memory, or restores it from the swap space
    ///
    /// A restored tile becomes the most recently used one and may push
    /// older tiles out. Unknown tiles yield `None` without side effects.
    pub fn get(&self, owner: &Arc<O>, x: u32, y: u32) -> Option<TileData> {
        let mut state = self.state.lock();
        match self.owners.lookup(owner) {
            Some(owner_id) => self.get_locked(&mut state, TileKey::new(owner_id, x, y)),
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Returns several tiles of one owner; missing tiles are `None`
    pub fn get_tiles(&self, owner: &Arc<O>, coords: &[(u32, u32)]) -> Vec<Option<TileData>> {
        let mut state = self.state.lock();
        let Some(owner_id) = self.owners.lookup(owner) else {
            state.misses += coords.len() as u64;
            return vec![None; coords.len()];
        };

        coords
            .iter()
            .map(|&(x, y)| self.get_locked(&mut state, TileKey::new(owner_id, x, y)))
            .collect()
    }

    /// Returns every tile of the owner the cache can produce, in row order
    pub fn get_owner_tiles(&self, owner: &Arc<O>) -> Vec<(u32, u32, TileData)> {
        let Some(owner_id) = self.owners.lookup(owner) else {
            return Vec::new();
        };

        let mut state = self.state.lock();
        let keys = state.index.keys_of(owner_id);
        keys.into_iter()
            .filter_map(|key| {
                self.get_locked(&mut state, key)
                    .map(|data| (key.x, key.y, data))
            })
            .collect()
    }

    /// Removes a tile from memory and from the swap space
    ///
    /// Returns whether a tile existed under the key.
    pub fn remove(&self, owner: &Arc<O>, x: u32, y: u32) -> bool {
        let Some(owner_id) = self.owners.lookup(owner) else {
            return false;
        };

        let mut state = self.state.lock();
        self.remove_locked(&mut state, TileKey::new(owner_id, x, y))
    }

    /// Removes every tile of the owner known to the cache
    ///
    /// Call this when the owning image is disposed, so its swapped tiles do
    /// not linger in the swap space. Returns the number of tiles removed.
    pub fn remove_all(&self, owner: &Arc<O>) -> usize {
        let removed = match self.owners.lookup(owner) {
            Some(owner_id) => {
                let mut state = self.state.lock();
                let keys = state.index.keys_of(owner_id);
                self.remove_keys_locked(&mut state, keys)
            }
            None => 0,
        };
        self.prune_owners();
        removed
    }

    /// Removes every tile of the owner, sweeping the whole tile grid
    ///
    /// Besides the tiles the cache knows about, every coordinate of `grid`
    /// is deleted from the swap space.
    pub fn remove_all_within(&self, owner: &Arc<O>, grid: TileGrid) -> usize {
        let removed = match self.owners.lookup(owner) {
            Some(owner_id) => {
                let mut state = self.state.lock();
                let mut keys: BTreeSet<TileKey> = state.index.keys_of(owner_id).into_iter().collect();
                keys.extend(grid.coords().map(|(x, y)| TileKey::new(owner_id, x, y)));
                self.remove_keys_locked(&mut state, keys)
            }
            None => 0,
        };
        self.prune_owners();
        removed
    }

    /// Forgets owners that have been dropped, removing all their tiles
    ///
    /// Returns the number of tiles removed.
    pub fn prune_owners(&self) -> usize {
        let dropped = self.owners.prune();
        if dropped.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        let keys: Vec<TileKey> = dropped
            .iter()
            .flat_map(|&owner_id| state.index.keys_of(owner_id))
            .collect();
        let removed = self.remove_keys_locked(&mut state, keys);

        debug!(owners = dropped.len(), tiles = removed, "Pruned dropped tile owners");
        removed
    }

    /// Drops all resident tiles and deletes all swapped ones
    ///
    /// Hit/miss counters and the recency clock are reset.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        for (key, tile_state) in state.index.drain() {
            if let TileState::Resident(tile) = &tile_state {
                self.diagnose(CacheAction::RemoveFromFlush, &key, tile.size());
            }
            self.swap_space.delete_tile(&key);
        }
        state.hits = 0;
        state.misses = 0;
        drop(state);

        self.owners.prune();
    }

    /// Runs an eviction pass down to the low-water mark
    pub fn memory_control(&self) {
        let mut state = self.state.lock();
        self.memory_control_locked(&mut state, None);
    }

    /// Returns the memory capacity in bytes
    pub fn memory_capacity(&self) -> u64 {
        self.state.lock().memory_capacity
    }

    /// Sets the memory capacity, evicting if usage is now above it
    pub fn set_memory_capacity(&self, memory_capacity: u64) {
        let mut state = self.state.lock();
        state.memory_capacity = memory_capacity;
        if state.index.memory_used() > memory_capacity {
            self.memory_control_locked(&mut state, None);
        }
    }

    /// Returns the memory threshold
    pub fn memory_threshold(&self) -> f32 {
        self.state.lock().memory_threshold
    }

    /// Sets the memory threshold and evicts down to the new low-water mark
    pub fn set_memory_threshold(&self, memory_threshold: f32) -> Result<()> {
        check_threshold(memory_threshold)?;
        let mut state = self.state.lock();
        state.memory_threshold = memory_threshold;
        self.memory_control_locked(&mut state, None);
        Ok(())
    }

    /// Returns the bytes used by resident tiles
    pub fn memory_used(&self) -> u64 {
        self.state.lock().index.memory_used()
    }

    /// Returns the number of resident tiles
    pub fn tile_count(&self) -> usize {
        self.state.lock().index.resident_count()
    }

    /// Returns the number of tiles held only by the swap space
    pub fn swapped_count(&self) -> usize {
        self.state.lock().index.swapped_count()
    }

    /// Returns the number of lookups answered from memory
    pub fn hit_count(&self) -> u64 {
        self.state.lock().hits
    }

    /// Returns the number of lookups that found nothing
    pub fn miss_count(&self) -> u64 {
        self.state.lock().misses
    }

    /// Resets hit and miss counters
    pub fn reset_counts(&self) {
        let mut state = self.state.lock();
        state.hits = 0;
        state.misses = 0;
    }

    /// Returns whether the tile is resident
    pub fn contains_resident(&self, owner: &Arc<O>, x: u32, y: u32) -> bool {
        self.owners
            .lookup(owner)
            .map(|owner_id| self.state.lock().index.is_resident(&TileKey::new(owner_id, x, y)))
            .unwrap_or(false)
    }

    /// Returns whether the tile is swapped out
    pub fn is_swapped(&self, owner: &Arc<O>, x: u32, y: u32) -> bool {
        self.owners
            .lookup(owner)
            .map(|owner_id| self.state.lock().index.is_swapped(&TileKey::new(owner_id, x, y)))
            .unwrap_or(false)
    }

    /// Resident keys from least to most recently used
    pub fn lru_keys(&self) -> Vec<TileKey> {
        self.state.lock().index.lru_keys()
    }

    /// Returns cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            tile_count: state.index.resident_count(),
            swapped_count: state.index.swapped_count(),
            memory_used: state.index.memory_used(),
            memory_capacity: state.memory_capacity,
            memory_threshold: state.memory_threshold,
            hits: state.hits,
            misses: state.misses,
            swap_ins: state.swap_ins,
            swap_outs: state.swap_outs,
            failed_swap_outs: state.failed_swap_outs,
        }
    }

    /// Reports every tile action as a `tracing` event
    pub fn enable_diagnostics(&self) {
        self.diagnostics.store(true, Ordering::Relaxed);
    }

    /// Stops reporting tile actions
    pub fn disable_diagnostics(&self) {
        self.diagnostics.store(false, Ordering::Relaxed);
    }

    fn add_locked(&self, state: &mut CacheState, key: TileKey, data: TileData) {
        let tile = MemoryTile::new(key, data);
        let size = tile.size();

        if state.index.is_resident(&key) {
            state.index.insert_resident(tile);
            state.hits += 1;
            self.diagnose(CacheAction::UpdateFromAdd, &key, size);
        } else if state.is_oversized(size) && self.swap_through(state, &tile) {
            return;
        } else {
            state.index.insert_resident(tile);
            self.diagnose(CacheAction::Add, &key, size);
        }

        if state.index.memory_used() > state.memory_capacity {
            self.memory_control_locked(state, Some(key));
        }
    }

    /// Writes a tile that does not fit straight to the swap space
    fn swap_through(&self, state: &mut CacheState, tile: &MemoryTile) -> bool {
        let key = tile.key();
        if self.swap_space.store_tile(tile) {
            state.index.set_swapped(key);
            state.swap_outs += 1;
            self.diagnose(CacheAction::SwapOut, &key, tile.size());
            true
        } else {
            state.failed_swap_outs += 1;
            self.diagnose(CacheAction::SwapOutFailed, &key, tile.size());
            warn!(tile = %key, size = tile.size(), "Oversized tile could not be swapped, keeping it resident");
            false
        }
    }

    fn get_locked(&self, state: &mut CacheState, key: TileKey) -> Option<TileData> {
        if let Some(data) = state.index.touch(&key) {
            state.hits += 1;
            self.diagnose(CacheAction::UpdateFromGetTile, &key, data.len() as u64);
            return Some(data);
        }

        let tile = match self.swap_space.restore_tile(&key) {
            Some(tile) => tile,
            None => {
                if state.index.forget(&key).is_some() {
                    warn!(tile = %key, "Swapped tile could not be restored");
                }
                state.misses += 1;
                return None;
            }
        };

        let size = tile.size();
        state.swap_ins += 1;
        self.diagnose(CacheAction::SwapIn, &key, size);

        if state.is_oversized(size) {
            state.index.set_swapped(key);
            return Some(tile.into_data());
        }

        let data = TileData::clone(tile.data());
        state.index.insert_resident(tile);

        if state.index.memory_used() > state.memory_capacity {
            self.memory_control_locked(state, Some(key));
        }

        Some(data)
    }

    fn remove_locked(&self, state: &mut CacheState, key: TileKey) -> bool {
        let known = match state.index.forget(&key) {
            Some(TileState::Resident(tile)) => {
                self.diagnose(CacheAction::Remove, &key, tile.size());
                true
            }
            Some(TileState::Swapped) => true,
            None => false,
        };

        // Resident tiles may still have a stale copy from an earlier eviction.
        let deleted = self.swap_space.delete_tile(&key);
        known || deleted
    }

    fn remove_keys_locked<I>(&self, state: &mut CacheState, keys: I) -> usize
    where
        I: IntoIterator<Item = TileKey>,
    {
        keys.into_iter()
            .filter(|&key| self.remove_locked(state, key))
            .count()
    }

    /// Swaps out least recently used tiles until usage is at the low-water mark
    ///
    /// Tiles the swap space refuses stay resident and are skipped for the
    /// rest of this pass; the cache then remains over budget.
    fn memory_control_locked(&self, state: &mut CacheState, protect: Option<TileKey>) {
        let limit = state.low_water_mark();
        let start_used = state.index.memory_used();
        if start_used <= limit {
            return;
        }

        let mut evicted = 0usize;
        let mut failed = 0usize;

        for key in state.index.lru_keys() {
            if state.index.memory_used() <= limit {
                break;
            }
            if Some(key) == protect {
                continue;
            }

            let Some(tile) = state.index.resident(&key) else {
                continue;
            };
            let size = tile.size();

            if self.swap_space.store_tile(tile) {
                state.index.set_swapped(key);
                state.swap_outs += 1;
                evicted += 1;
                self.diagnose(CacheAction::RemoveFromMemoryControl, &key, size);
            } else {
                state.failed_swap_outs += 1;
                failed += 1;
                self.diagnose(CacheAction::SwapOutFailed, &key, size);
                warn!(tile = %key, size, "Swap space refused tile, keeping it resident");
            }
        }

        debug!(
            evicted,
            failed,
            before = start_used,
            after = state.index.memory_used(),
            limit,
            "Eviction pass finished"
        );
    }

    fn diagnose(&self, action: CacheAction, key: &TileKey, size: u64) {
        if self.diagnostics.load(Ordering::Relaxed) {
            trace!(
                action = action.name(),
                owner = key.owner.0,
                x = key.x,
                y = key.y,
                size,
                "Tile cache action"
            );
        }
    }
}

fn check_threshold(memory_threshold: f32) -> Result<()> {
    if (0.0..=1.0).contains(&memory_threshold) {
        Ok(())
    } else {
        Err(Error::InvalidThreshold(memory_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::MemorySwapSpace;

    struct Image;

    /// Collects the `action` field of every event it sees
    #[derive(Clone, Default)]
    struct ActionLog(Arc<Mutex<Vec<String>>>);

    struct ActionField(Option<String>);

    impl tracing::field::Visit for ActionField {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "action" {
                self.0 = Some(value.to_string());
            }
        }

        fn record_debug(&mut self, _field: &tracing::field::Field, _value: &dyn std::fmt::Debug) {}
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ActionLog {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            let mut field = ActionField(None);
            event.record(&mut field);
            if let Some(action) = field.0 {
                self.0.lock().push(action);
            }
        }
    }

    fn cache_with(capacity: u64) -> (SwappingTileCache<Image>, Arc<MemorySwapSpace>) {
        let swap = Arc::new(MemorySwapSpace::new());
        let cache = SwappingTileCache::new(capacity, Arc::clone(&swap) as Arc<dyn SwapSpace>);
        (cache, swap)
    }

    #[test]
    fn test_cache_basic() {
        let (cache, _swap) = cache_with(1024);
        let image = Arc::new(Image);

        cache.add(&image, 0, 0, vec![1, 2, 3]);

        assert_eq!(cache.tile_count(), 1);
        assert_eq!(cache.memory_used(), 3);
        assert_eq!(*cache.get(&image, 0, 0).unwrap(), vec![1, 2, 3]);
        assert_eq!(cache.hit_count(), 1);
    }

    #[test]
    fn test_add_replaces_payload() {
        let (cache, _swap) = cache_with(1024);
        let image = Arc::new(Image);

        cache.add(&image, 0, 0, vec![1; 10]);
        cache.add(&image, 1, 0, vec![2; 10]);
        cache.add(&image, 0, 0, vec![3; 30]);

        assert_eq!(cache.tile_count(), 2);
        assert_eq!(cache.memory_used(), 40);
        assert_eq!(*cache.get(&image, 0, 0).unwrap(), vec![3; 30]);

        let owner = cache.owner_id(&image).unwrap();
        assert_eq!(cache.lru_keys().last(), Some(&TileKey::new(owner, 0, 0)));
    }

    #[test]
    fn test_overflow_evicts_to_low_water_mark() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        for x in 0..5 {
            cache.add(&image, x, 0, vec![x as u8; 20]);
        }
        assert_eq!(cache.memory_used(), 100);
        assert!(swap.is_empty());

        cache.add(&image, 5, 0, vec![5; 20]);
        // 120 > 100, evict down to 75
        assert_eq!(cache.memory_used(), 60);
        assert_eq!(swap.len(), 3);
        assert!(cache.is_swapped(&image, 0, 0));
        assert!(cache.is_swapped(&image, 2, 0));
        assert!(cache.contains_resident(&image, 5, 0));
    }

    #[test]
    fn test_get_restores_swapped_tile() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![x as u8; 20]);
        }
        assert!(cache.is_swapped(&image, 0, 0));

        let tile = cache.get(&image, 0, 0).unwrap();
        assert_eq!(*tile, vec![0u8; 20]);
        assert!(cache.contains_resident(&image, 0, 0));
        assert!(!cache.is_swapped(&image, 0, 0));
        assert_eq!(cache.stats().swap_ins, 1);
        assert_eq!(swap.restore_count(), 1);
    }

    #[test]
    fn test_unknown_tile_is_absent() {
        let (cache, _swap) = cache_with(100);
        let image = Arc::new(Image);
        let stranger = Arc::new(Image);

        cache.add(&image, 0, 0, vec![1]);
        assert!(cache.get(&image, 9, 9).is_none());
        assert!(cache.get(&stranger, 0, 0).is_none());
        assert!(cache.owner_id(&stranger).is_none());
        assert_eq!(cache.miss_count(), 2);
        assert_eq!(cache.tile_count(), 1);
    }

    #[test]
    fn test_remove_reports_existence() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![0; 20]);
        }
        assert!(cache.is_swapped(&image, 0, 0));

        assert!(cache.remove(&image, 0, 0));
        assert!(cache.remove(&image, 5, 0));
        assert!(!cache.remove(&image, 7, 7));
        assert!(cache.get(&image, 0, 0).is_none());
        assert!(cache.get(&image, 5, 0).is_none());
        assert!(!swap.contains_tile(&TileKey::new(cache.owner_id(&image).unwrap(), 0, 0)));
    }

    #[test]
    fn test_remove_deletes_stale_swap_copy() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![0; 20]);
        }
        cache.get(&image, 0, 0).unwrap();
        let key = TileKey::new(cache.owner_id(&image).unwrap(), 0, 0);
        assert!(cache.contains_resident(&image, 0, 0));
        assert!(swap.contains_tile(&key));

        assert!(cache.remove(&image, 0, 0));
        assert!(!swap.contains_tile(&key));
    }

    #[test]
    fn test_failed_store_keeps_tile_resident() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);
        swap.set_fail_stores(true);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![0; 20]);
        }

        assert_eq!(cache.tile_count(), 6);
        assert_eq!(cache.memory_used(), 120);
        assert_eq!(cache.stats().failed_swap_outs, 5);
        for x in 0..6 {
            assert!(cache.contains_resident(&image, x, 0));
        }
    }

    #[test]
    fn test_oversized_tile_goes_straight_to_swap() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        cache.add(&image, 0, 0, vec![1; 10]);
        cache.add(&image, 1, 0, vec![2; 200]);

        assert!(cache.is_swapped(&image, 1, 0));
        assert!(cache.contains_resident(&image, 0, 0));
        assert_eq!(cache.memory_used(), 10);
        assert_eq!(swap.len(), 1);

        let tile = cache.get(&image, 1, 0).unwrap();
        assert_eq!(tile.len(), 200);
        assert!(cache.is_swapped(&image, 1, 0));
        assert_eq!(cache.memory_used(), 10);
    }

    #[test]
    fn test_zero_capacity_swaps_everything() {
        let (cache, swap) = cache_with(0);
        let image = Arc::new(Image);

        cache.add(&image, 0, 0, vec![1; 4]);
        assert_eq!(cache.tile_count(), 0);
        assert_eq!(swap.len(), 1);
        assert_eq!(*cache.get(&image, 0, 0).unwrap(), vec![1; 4]);
    }

    #[test]
    fn test_set_memory_capacity_evicts() {
        let (cache, swap) = cache_with(1000);
        let image = Arc::new(Image);

        for x in 0..4 {
            cache.add(&image, x, 0, vec![0; 100]);
        }
        cache.set_memory_capacity(200);

        assert_eq!(cache.memory_capacity(), 200);
        assert_eq!(cache.memory_used(), 100);
        assert_eq!(swap.len(), 3);
    }

    #[test]
    fn test_set_memory_threshold() {
        let (cache, _swap) = cache_with(1000);
        let image = Arc::new(Image);

        for x in 0..4 {
            cache.add(&image, x, 0, vec![0; 100]);
        }
        cache.set_memory_threshold(0.25).unwrap();
        assert_eq!(cache.memory_used(), 200);
        assert_eq!(cache.memory_threshold(), 0.25);

        assert!(matches!(cache.set_memory_threshold(1.5), Err(Error::InvalidThreshold(_))));
        assert!(cache.set_memory_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_low_water_mark_with_inexact_threshold() {
        let swap: Arc<dyn SwapSpace> = Arc::new(MemorySwapSpace::new());
        let cache = SwappingTileCache::<Image>::with_threshold(100, 0.7, swap).unwrap();
        let image = Arc::new(Image);

        for x in 0..11 {
            cache.add(&image, x, 0, vec![0; 10]);
        }
        // 110 > 100, evict down to 70
        assert_eq!(cache.memory_used(), 70);
        assert_eq!(cache.swapped_count(), 4);

        let swap: Arc<dyn SwapSpace> = Arc::new(MemorySwapSpace::new());
        let cache = SwappingTileCache::<Image>::with_threshold(1000, 0.9, swap).unwrap();
        for x in 0..11 {
            cache.add(&image, x, 0, vec![0; 100]);
        }
        assert_eq!(cache.memory_used(), 900);
        assert_eq!(cache.swapped_count(), 2);
    }

    #[test]
    fn test_with_threshold_rejects_invalid() {
        let swap: Arc<dyn SwapSpace> = Arc::new(MemorySwapSpace::new());
        assert!(SwappingTileCache::<Image>::with_threshold(100, -0.1, Arc::clone(&swap)).is_err());
        let cache = SwappingTileCache::<Image>::with_threshold(100, 0.5, swap).unwrap();
        assert_eq!(cache.memory_threshold(), 0.5);
    }

    #[test]
    fn test_batch_add_and_get() {
        let (cache, _swap) = cache_with(1000);
        let image = Arc::new(Image);

        cache.add_tiles(&image, (0..3).map(|x| (x, 0, vec![x as u8; 8])));
        let tiles = cache.get_tiles(&image, &[(0, 0), (2, 0), (9, 9)]);

        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[0].as_deref(), Some(&vec![0u8; 8]));
        assert_eq!(tiles[1].as_deref(), Some(&vec![2u8; 8]));
        assert!(tiles[2].is_none());
    }

    #[test]
    fn test_get_owner_tiles_includes_swapped() {
        let (cache, _swap) = cache_with(50);
        let image = Arc::new(Image);
        let other = Arc::new(Image);

        for x in 0..4 {
            cache.add(&image, x, 0, vec![x as u8; 20]);
        }
        cache.add(&other, 0, 0, vec![9; 5]);

        let tiles = cache.get_owner_tiles(&image);
        let coords: Vec<_> = tiles.iter().map(|(x, y, _)| (*x, *y)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_remove_all() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);
        let other = Arc::new(Image);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![0; 20]);
        }
        cache.add(&other, 0, 0, vec![0; 1]);

        assert_eq!(cache.remove_all(&image), 6);
        assert_eq!(cache.tile_count(), 1);
        assert_eq!(cache.swapped_count(), 0);
        assert!(swap.is_empty());
        assert!(cache.contains_resident(&other, 0, 0));
    }

    #[test]
    fn test_remove_all_within_sweeps_unknown_swap_tiles() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        cache.add(&image, 0, 0, vec![0; 10]);
        let owner = cache.owner_id(&image).unwrap();
        let foreign = MemoryTile::new(TileKey::new(owner, 3, 3), Arc::new(vec![1; 10]));
        swap.store_tile(&foreign);

        assert_eq!(cache.remove_all_within(&image, TileGrid::new(4, 4)), 2);
        assert!(swap.is_empty());
        assert_eq!(cache.tile_count(), 0);
    }

    #[test]
    fn test_remove_all_within_grid_at_coordinate_limit() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        cache.add(&image, u32::MAX, u32::MAX, vec![0; 10]);
        let grid = TileGrid {
            min_tile_x: u32::MAX - 2,
            min_tile_y: u32::MAX - 2,
            num_x_tiles: 8,
            num_y_tiles: 8,
        };

        assert_eq!(cache.remove_all_within(&image, grid), 1);
        assert_eq!(cache.tile_count(), 0);
        assert!(swap.is_empty());
    }

    #[test]
    fn test_prune_dropped_owner() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![0; 20]);
        }
        drop(image);

        assert_eq!(cache.prune_owners(), 6);
        assert_eq!(cache.tile_count(), 0);
        assert_eq!(cache.swapped_count(), 0);
        assert!(swap.is_empty());
    }

    #[test]
    fn test_flush() {
        let (cache, swap) = cache_with(100);
        let image = Arc::new(Image);

        for x in 0..6 {
            cache.add(&image, x, 0, vec![0; 20]);
        }
        cache.get(&image, 0, 0);
        cache.flush();

        assert_eq!(cache.tile_count(), 0);
        assert_eq!(cache.swapped_count(), 0);
        assert_eq!(cache.memory_used(), 0);
        assert_eq!(cache.hit_count(), 0);
        assert!(swap.is_empty());
        assert!(cache.get(&image, 1, 0).is_none());
    }

    #[test]
    fn test_stats() {
        let (cache, _swap) = cache_with(10);
        let image = Arc::new(Image);

        cache.add(&image, 0, 0, vec![1, 2, 3]);
        cache.add(&image, 0, 1, vec![4, 5]);
        cache.get(&image, 0, 0);
        cache.get(&image, 5, 5);

        let stats = cache.stats();
        assert_eq!(stats.tile_count, 2);
        assert_eq!(stats.memory_used, 5);
        assert_eq!(stats.memory_capacity, 10);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
        assert!((stats.memory_utilization() - 0.5).abs() < 1e-9);

        cache.reset_counts();
        assert_eq!(cache.hit_count(), 0);
        assert_eq!(cache.miss_count(), 0);
    }

    #[test]
    fn test_diagnostics_report_tile_actions() {
        use tracing_subscriber::layer::SubscriberExt;

        let log = ActionLog::default();
        let subscriber = tracing_subscriber::registry().with(log.clone());
        let (cache, _swap) = cache_with(100);
        let image = Arc::new(Image);

        tracing::subscriber::with_default(subscriber, || {
            cache.add(&image, 0, 0, vec![0; 40]);

            cache.enable_diagnostics();
            cache.add(&image, 1, 0, vec![0; 40]);
            cache.add(&image, 1, 0, vec![1; 40]);
            // 120 > 100, evict down to 75
            cache.add(&image, 2, 0, vec![0; 40]);
            cache.get(&image, 2, 0);
            cache.get(&image, 0, 0);

            cache.disable_diagnostics();
            cache.remove(&image, 2, 0);
        });

        assert_eq!(
            *log.0.lock(),
            vec![
                "add",
                "timestamp_update_by_add",
                "add",
                "remove_by_memory_control",
                "remove_by_memory_control",
                "timestamp_update_by_get_tile",
                "swap_in",
            ]
        );
    }

    #[test]
    fn test_cache_concurrent_access() {
        use std::thread;

        let swap: Arc<dyn SwapSpace> = Arc::new(MemorySwapSpace::new());
        let cache = Arc::new(SwappingTileCache::<Image>::new(2000, swap));
        let image = Arc::new(Image);

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let image = Arc::clone(&image);
                thread::spawn(move || {
                    for j in 0..50u32 {
                        cache.add(&image, i, j, vec![i as u8; 40]);
                        assert_eq!(*cache.get(&image, i, j).unwrap(), vec![i as u8; 40]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.memory_used() <= 2000);
        let stats = cache.stats();
        assert_eq!(stats.tile_count + stats.swapped_count, 400);
        assert_eq!(stats.memory_used, stats.tile_count as u64 * 40);
    }
}

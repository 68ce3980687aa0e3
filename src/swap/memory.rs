//! In-memory swap space

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use dashmap::DashMap;
use crate::cache::{MemoryTile, TileData};
use crate::swap::SwapSpace;
use crate::types::TileKey;

/// Swap space keeping tiles in a concurrent map
///
/// An optional tile limit makes stores fail once the space is full, and
/// stores can be switched off entirely to simulate a failing device.
pub struct MemorySwapSpace {
    tiles: DashMap<TileKey, TileData>,
    max_tiles: Option<usize>,
    fail_stores: AtomicBool,
    store_count: AtomicU64,
    restore_count: AtomicU64,
}

impl MemorySwapSpace {
    /// Creates an unbounded swap space
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Creates a swap space holding at most `max_tiles` tiles
    pub fn with_limit(max_tiles: Option<usize>) -> Self {
        Self {
            tiles: DashMap::new(),
            max_tiles,
            fail_stores: AtomicBool::new(false),
            store_count: AtomicU64::new(0),
            restore_count: AtomicU64::new(0),
        }
    }

    /// Makes every following store fail (or succeed again)
    pub fn set_fail_stores(&self, fail: bool) {
        self.fail_stores.store(fail, Ordering::SeqCst);
    }

    /// Number of tiles currently stored
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Stored keys in sorted order
    pub fn keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.tiles.iter().map(|entry| *entry.key()).collect();
        keys.sort();
        keys
    }

    /// Number of successful stores so far
    pub fn store_count(&self) -> u64 {
        self.store_count.load(Ordering::Relaxed)
    }

    /// Number of successful restores so far
    pub fn restore_count(&self) -> u64 {
        self.restore_count.load(Ordering::Relaxed)
    }

    /// Drops every stored tile
    pub fn clear(&self) {
        self.tiles.clear();
    }
}

impl Default for MemorySwapSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapSpace for MemorySwapSpace {
    fn contains_tile(&self, key: &TileKey) -> bool {
        self.tiles.contains_key(key)
    }

    fn store_tile(&self, tile: &MemoryTile) -> bool {
        if self.fail_stores.load(Ordering::SeqCst) {
            return false;
        }

        let key = tile.key();
        if let Some(max_tiles) = self.max_tiles {
            if self.tiles.len() >= max_tiles && !self.tiles.contains_key(&key) {
                return false;
            }
        }

        self.tiles.insert(key, Arc::clone(tile.data()));
        self.store_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn restore_tile(&self, key: &TileKey) -> Option<MemoryTile> {
        let data = self.tiles.get(key).map(|entry| Arc::clone(entry.value()))?;
        self.restore_count.fetch_add(1, Ordering::Relaxed);
        Some(MemoryTile::new(*key, data))
    }

    fn delete_tile(&self, key: &TileKey) -> bool {
        self.tiles.remove(key).is_some()
    }
}

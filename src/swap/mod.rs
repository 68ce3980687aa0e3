//! Secondary storage for tiles evicted from memory
//!
//! The cache decides what to evict and when; a [`SwapSpace`] only keeps
//! tiles by key. Failures are reported through the return values, never
//! raised: a failed store leaves the tile resident, a failed restore reads
//! as an absent tile.

pub mod disk;
pub mod memory;

pub use disk::DiskSwapSpace;
pub use memory::MemorySwapSpace;

use crate::cache::MemoryTile;
use crate::types::TileKey;

/// Backend that stores, restores and deletes individual tiles
///
/// Calls are made synchronously while the cache holds its state lock, so
/// implementations must not call back into the cache.
pub trait SwapSpace: Send + Sync {
    /// Returns whether a tile with this key is currently stored
    fn contains_tile(&self, key: &TileKey) -> bool;

    /// Persists a tile, replacing any stored copy; `false` on failure
    fn store_tile(&self, tile: &MemoryTile) -> bool;

    /// Reads a stored tile back without removing it
    fn restore_tile(&self, key: &TileKey) -> Option<MemoryTile>;

    /// Deletes a stored tile; `false` if nothing was stored under the key
    fn delete_tile(&self, key: &TileKey) -> bool;
}

//! Tile state index with least-recently-used ordering

use std::collections::{BTreeMap, HashMap};
use crate::cache::memory_tile::{MemoryTile, TileData};
use crate::types::{OwnerId, TileKey};

/// Where a known tile currently lives
#[derive(Debug)]
pub(crate) enum TileState {
    /// Held in memory and counted against the budget
    Resident(MemoryTile),
    /// Persisted in the swap space only
    Swapped,
}

/// Index of every tile the cache knows about
///
/// Resident tiles are ordered by a logical clock: each touch stamps the tile
/// with the next clock value, so the smallest stamp is the least recently used.
/// Stamps are unique, which makes the order total across owners.
#[derive(Debug, Default)]
pub(crate) struct TileIndex {
    tiles: HashMap<TileKey, TileState>,
    recency: BTreeMap<u64, TileKey>,
    clock: u64,
    memory_used: u64,
}

impl TileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held by resident tiles
    pub fn memory_used(&self) -> u64 {
        self.memory_used
    }

    /// Number of resident tiles
    pub fn resident_count(&self) -> usize {
        self.recency.len()
    }

    /// Number of tiles known to be swapped out
    pub fn swapped_count(&self) -> usize {
        self.tiles.len() - self.recency.len()
    }

    pub fn resident(&self, key: &TileKey) -> Option<&MemoryTile> {
        match self.tiles.get(key) {
            Some(TileState::Resident(tile)) => Some(tile),
            _ => None,
        }
    }

    pub fn is_resident(&self, key: &TileKey) -> bool {
        self.resident(key).is_some()
    }

    pub fn is_swapped(&self, key: &TileKey) -> bool {
        matches!(self.tiles.get(key), Some(TileState::Swapped))
    }

    /// Marks a resident tile as most recently used and returns its payload
    pub fn touch(&mut self, key: &TileKey) -> Option<TileData> {
        let stamp = self.next_stamp();
        let tile = match self.tiles.get_mut(key) {
            Some(TileState::Resident(tile)) => tile,
            _ => return None,
        };

        self.recency.remove(&tile.time_stamp());
        tile.set_time_stamp(stamp);
        self.recency.insert(stamp, *key);
        Some(TileData::clone(tile.data()))
    }

    /// Makes a tile resident as the most recently used entry
    ///
    /// Replaces any resident tile under the same key and returns it.
    pub fn insert_resident(&mut self, mut tile: MemoryTile) -> Option<MemoryTile> {
        let key = tile.key();
        let replaced = self.detach(&key);

        let stamp = self.next_stamp();
        tile.set_time_stamp(stamp);
        self.memory_used += tile.size();
        self.recency.insert(stamp, key);
        self.tiles.insert(key, TileState::Resident(tile));

        replaced
    }

    /// Records a tile as swapped out, releasing its memory if it was resident
    pub fn set_swapped(&mut self, key: TileKey) -> Option<MemoryTile> {
        let evicted = self.detach(&key);
        self.tiles.insert(key, TileState::Swapped);
        evicted
    }

    /// Drops a tile from the index entirely
    pub fn forget(&mut self, key: &TileKey) -> Option<TileState> {
        let state = self.tiles.remove(key)?;
        if let TileState::Resident(tile) = &state {
            self.recency.remove(&tile.time_stamp());
            self.memory_used -= tile.size();
        }
        Some(state)
    }

    /// Resident keys from least to most recently used
    pub fn lru_keys(&self) -> Vec<TileKey> {
        self.recency.values().copied().collect()
    }

    /// All known keys of one owner, resident or swapped, in coordinate order
    pub fn keys_of(&self, owner: OwnerId) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self
            .tiles
            .keys()
            .filter(|key| key.owner == owner)
            .copied()
            .collect();
        keys.sort_by_key(|key| (key.y, key.x));
        keys
    }

    /// Empties the index and resets the clock
    pub fn drain(&mut self) -> Vec<(TileKey, TileState)> {
        self.recency.clear();
        self.clock = 0;
        self.memory_used = 0;
        self.tiles.drain().collect()
    }

    fn next_stamp(&mut self) -> u64 {
        let stamp = self.clock;
        self.clock += 1;
        stamp
    }

    fn detach(&mut self, key: &TileKey) -> Option<MemoryTile> {
        match self.tiles.remove(key) {
            Some(TileState::Resident(tile)) => {
                self.recency.remove(&tile.time_stamp());
                self.memory_used -= tile.size();
                Some(tile)
            }
            Some(TileState::Swapped) | None => None,
        }
    }
}

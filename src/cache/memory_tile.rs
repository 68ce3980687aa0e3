//! In-memory representation of one cached tile

use std::sync::Arc;
use crate::types::TileKey;

/// Decoded tile payload, shared between the cache and its callers
pub type TileData = Arc<Vec<u8>>;

/// One tile held by the cache or handed to a swap space
#[derive(Debug, Clone)]
pub struct MemoryTile {
    key: TileKey,
    data: TileData,
    time_stamp: u64,
}

impl MemoryTile {
    /// Creates a tile for the given key
    pub fn new(key: TileKey, data: TileData) -> Self {
        Self {
            key,
            data,
            time_stamp: 0,
        }
    }

    /// Returns the tile key
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Returns the tile payload
    pub fn data(&self) -> &TileData {
        &self.data
    }

    /// Consumes the tile and returns its payload
    pub fn into_data(self) -> TileData {
        self.data
    }

    /// Size of the payload in bytes, as counted against the memory budget
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Recency marker; larger values were touched more recently
    pub fn time_stamp(&self) -> u64 {
        self.time_stamp
    }

    pub(crate) fn set_time_stamp(&mut self, time_stamp: u64) {
        self.time_stamp = time_stamp;
    }
}

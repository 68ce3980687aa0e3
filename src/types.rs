//! Core data types for tileswap

use std::fmt;
use serde::{Deserialize, Serialize};

/// Small integer identity assigned to a tile owner (one tiled image)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one tile: owner plus column/row in the owner's tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Owning image
    pub owner: OwnerId,
    /// Tile column
    pub x: u32,
    /// Tile row
    pub y: u32,
}

impl TileKey {
    /// Creates a new tile key
    pub fn new(owner: OwnerId, x: u32, y: u32) -> Self {
        Self { owner, x, y }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner {} ({}, {})", self.owner, self.x, self.y)
    }
}

/// Tile layout of an owning image
///
/// Bounds the coordinates an owner can have tiles at, used when sweeping
/// an image's tiles out of the swap space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    /// First tile column
    pub min_tile_x: u32,
    /// First tile row
    pub min_tile_y: u32,
    /// Number of tile columns
    pub num_x_tiles: u32,
    /// Number of tile rows
    pub num_y_tiles: u32,
}

impl TileGrid {
    /// Creates a grid starting at tile (0, 0)
    pub fn new(num_x_tiles: u32, num_y_tiles: u32) -> Self {
        Self {
            min_tile_x: 0,
            min_tile_y: 0,
            num_x_tiles,
            num_y_tiles,
        }
    }

    /// Returns the total number of tiles
    pub fn tile_count(&self) -> u64 {
        self.num_x_tiles as u64 * self.num_y_tiles as u64
    }

    /// Returns whether the grid holds the given tile coordinate
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_tile_x
            && y >= self.min_tile_y
            && ((x - self.min_tile_x) as u64) < self.num_x_tiles as u64
            && ((y - self.min_tile_y) as u64) < self.num_y_tiles as u64
    }

    /// Iterates all tile coordinates, row by row
    ///
    /// A grid reaching past `u32::MAX` is cut off there.
    pub fn coords(&self) -> impl Iterator<Item = (u32, u32)> {
        let (x0, x1) = axis_range(self.min_tile_x, self.num_x_tiles);
        let (y0, y1) = axis_range(self.min_tile_y, self.num_y_tiles);
        (y0..y1).flat_map(move |y| (x0..x1).map(move |x| (x as u32, y as u32)))
    }
}

fn axis_range(min: u32, count: u32) -> (u64, u64) {
    let end = (min as u64 + count as u64).min(u32::MAX as u64 + 1);
    (min as u64, end)
}

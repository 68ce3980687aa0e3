//! tileswap - A swapping tile cache for large raster products
//!
//! Satellite scenes are processed tile by tile because a full scene rarely
//! fits in memory. tileswap keeps a byte-budgeted working set of decoded
//! tiles from any number of tiled images, swaps the least recently used
//! tiles to a pluggable [`SwapSpace`] when the budget is exceeded, and
//! restores them transparently on access.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```
//! use std::sync::Arc;
//! use tileswap::{MemorySwapSpace, SwapSpace, SwappingTileCache};
//!
//! struct Band;
//!
//! let swap: Arc<dyn SwapSpace> = Arc::new(MemorySwapSpace::new());
//! let cache = SwappingTileCache::<Band>::new(3 * 1024 + 1, swap);
//! let band = Arc::new(Band);
//!
//! for x in 0..4 {
//!     cache.add(&band, x, 0, vec![x as u8; 1024]);
//! }
//!
//! // The two oldest tiles were swapped out, and come back on demand.
//! assert!(cache.is_swapped(&band, 0, 0));
//! assert_eq!(cache.get(&band, 0, 0).unwrap()[0], 0);
//! assert!(cache.contains_resident(&band, 0, 0));
//! ```
//!
//! ## Swapping to Disk
//!
//! ```no_run
//! use std::sync::Arc;
//! use tileswap::{CacheConfig, TileGrid};
//!
//! let config = CacheConfig::compressed_temp(256 * 1024 * 1024);
//! let cache = config.build::<str>()?;
//!
//! let scene: Arc<str> = Arc::from("S1A_IW_GRDH");
//! cache.add(&scene, 0, 0, vec![0u8; 512 * 512]);
//!
//! // Done with the scene: make sure nothing of it stays in the swap directory.
//! cache.remove_all_within(&scene, TileGrid::new(40, 30));
//! # Ok::<(), tileswap::Error>(())
//! ```

pub mod error;
pub mod types;
pub mod compression;
pub mod cache;
pub mod swap;
pub mod config;

pub use error::{Error, Result};
pub use types::{OwnerId, TileGrid, TileKey};
pub use compression::SwapCompression;
pub use cache::{
    CacheAction, CacheStats, MemoryTile, SwappingTileCache, TileData,
    DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_THRESHOLD,
};
pub use swap::{DiskSwapSpace, MemorySwapSpace, SwapSpace};
pub use config::{CacheConfig, SwapConfig};

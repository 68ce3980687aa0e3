//! Cache configuration

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::cache::{SwappingTileCache, DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_THRESHOLD};
use crate::compression::SwapCompression;
use crate::error::{Error, Result};
use crate::swap::{DiskSwapSpace, MemorySwapSpace, SwapSpace};

/// Which swap space evicted tiles go to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SwapConfig {
    /// Keep swapped tiles in process memory
    Memory {
        /// Refuse stores beyond this many tiles
        #[serde(default)]
        max_tiles: Option<usize>,
    },
    /// Write swapped tiles to files
    Disk {
        /// Swap directory; a per-process temp directory when absent
        #[serde(default)]
        directory: Option<PathBuf>,
        /// Compression of swap files
        #[serde(default)]
        compression: SwapCompression,
    },
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig::Memory { max_tiles: None }
    }
}

/// Configuration for a swapping tile cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum resident bytes
    pub memory_capacity: u64,

    /// Fraction of the capacity kept after an eviction pass
    pub memory_threshold: f32,

    /// Swap space
    pub swap: SwapConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            swap: SwapConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration swapping to disk
    pub fn disk<P: Into<PathBuf>>(memory_capacity: u64, directory: P) -> Self {
        Self {
            memory_capacity,
            swap: SwapConfig::Disk {
                directory: Some(directory.into()),
                compression: SwapCompression::None,
            },
            ..Self::default()
        }
    }

    /// Creates a configuration swapping to deflate-compressed files in the temp directory
    pub fn compressed_temp(memory_capacity: u64) -> Self {
        Self {
            memory_capacity,
            swap: SwapConfig::Disk {
                directory: None,
                compression: SwapCompression::Deflate,
            },
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Checks values the cache cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.memory_threshold) {
            return Err(Error::InvalidThreshold(self.memory_threshold));
        }

        if let SwapConfig::Memory { max_tiles: Some(0) } = self.swap {
            return Err(Error::InvalidConfig(
                "memory swap space with max_tiles = 0 can never swap".to_string(),
            ));
        }

        Ok(())
    }

    /// Creates the configured swap space
    pub fn build_swap_space(&self) -> Result<Arc<dyn SwapSpace>> {
        let swap: Arc<dyn SwapSpace> = match &self.swap {
            SwapConfig::Memory { max_tiles } => Arc::new(MemorySwapSpace::with_limit(*max_tiles)),
            SwapConfig::Disk {
                directory: Some(directory),
                compression,
            } => Arc::new(DiskSwapSpace::with_compression(directory, *compression)?),
            SwapConfig::Disk {
                directory: None,
                compression,
            } => Arc::new(DiskSwapSpace::in_temp_dir(*compression)?),
        };
        Ok(swap)
    }

    /// Creates a cache from this configuration
    pub fn build<O: ?Sized + Send + Sync>(&self) -> Result<SwappingTileCache<O>> {
        self.validate()?;
        SwappingTileCache::with_threshold(
            self.memory_capacity,
            self.memory_threshold,
            self.build_swap_space()?,
        )
    }
}

//! Error types for tileswap

use std::io;
use thiserror::Error;

use crate::types::TileKey;

/// Result type for tileswap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while configuring the cache or talking to a swap backend
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be parsed
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Fill threshold outside of `0.0..=1.0`
    #[error("Invalid memory threshold: {0} (expected 0.0..=1.0)")]
    InvalidThreshold(f32),

    /// Configuration value rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Swap file header or payload is unreadable
    #[error("Corrupt swap file: {0}")]
    CorruptSwapFile(String),

    /// Swap file holds a different tile than the one requested
    #[error("Swap file key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: TileKey, found: TileKey },

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

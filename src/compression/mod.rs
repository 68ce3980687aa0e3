//! Compression of swapped tile payloads

pub mod deflate;

use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Compression applied to tiles written to a swap file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapCompression {
    /// No compression
    #[default]
    None,
    /// Deflate/ZIP compression
    Deflate,
}

impl SwapCompression {
    /// Creates compression from the swap file header tag
    pub fn from_tag(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SwapCompression::None),
            1 => Ok(SwapCompression::Deflate),
            _ => Err(Error::Unsupported(format!("Swap compression tag {}", value))),
        }
    }

    /// Returns the swap file header tag
    pub fn tag(&self) -> u8 {
        match self {
            SwapCompression::None => 0,
            SwapCompression::Deflate => 1,
        }
    }

    /// Returns the name of this compression type
    pub fn name(&self) -> &'static str {
        match self {
            SwapCompression::None => "None",
            SwapCompression::Deflate => "Deflate/ZIP",
        }
    }

    /// Compresses data
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            SwapCompression::None => Ok(data.to_vec()),
            SwapCompression::Deflate => deflate::compress(data),
        }
    }

    /// Decompresses data, checking the result against the expected length
    ///
    /// Lengths the stored bytes cannot possibly decode to are rejected
    /// before anything is allocated.
    pub fn decompress(&self, data: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let plausible = match self {
            SwapCompression::None => raw_len == data.len(),
            SwapCompression::Deflate => raw_len <= data.len().saturating_mul(deflate::MAX_EXPANSION),
        };
        if !plausible {
            return Err(Error::CorruptSwapFile(format!(
                "{} stored bytes cannot hold {} raw bytes ({})",
                data.len(),
                raw_len,
                self.name()
            )));
        }

        let decompressed = match self {
            SwapCompression::None => data.to_vec(),
            SwapCompression::Deflate => deflate::decompress(data, raw_len)?,
        };

        if decompressed.len() != raw_len {
            return Err(Error::CorruptSwapFile(format!(
                "expected {} bytes, decoded {}",
                raw_len,
                decompressed.len()
            )));
        }

        Ok(decompressed)
    }
}

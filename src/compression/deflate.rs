//! Deflate/ZIP compression

use crate::error::Result;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compresses data with zlib framing
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Upper bound on the deflate expansion ratio
pub const MAX_EXPANSION: usize = 1032;

/// Decompresses Deflate/ZIP compressed data
///
/// Output stops one byte past `max_len`, so a stream decoding to more than
/// `max_len` bytes is detectable without decoding all of it.
pub fn decompress(data: &[u8], max_len: usize) -> Result<Vec<u8>> {
    let capacity = max_len.min(data.len().saturating_mul(MAX_EXPANSION));
    let mut decompressed = Vec::with_capacity(capacity);
    ZlibDecoder::new(data)
        .take((max_len as u64).saturating_add(1))
        .read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

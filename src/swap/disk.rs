//! Disk-backed swap space
//!
//! Every swapped tile is one file in the swap directory:
//! ```text
//! {directory}/tile-{owner}-{x}-{y}.swp
//! ```
//! A file starts with a fixed little-endian header followed by the
//! (optionally deflate-compressed) payload. Files are written under a
//! temporary name and renamed into place, so a reader never sees a
//! half-written tile.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use memmap2::Mmap;
use tracing::{debug, warn};
use crate::cache::MemoryTile;
use crate::compression::SwapCompression;
use crate::error::{Error, Result};
use crate::swap::SwapSpace;
use crate::types::{OwnerId, TileKey};

/// Swap file magic bytes
pub const SWAP_MAGIC: [u8; 4] = *b"TSWP";

/// Swap file format version
pub const SWAP_VERSION: u8 = 1;

/// Size of the swap file header in bytes
pub const HEADER_LEN: usize = 36;

const FILE_PREFIX: &str = "tile-";
const FILE_EXTENSION: &str = "swp";

/// Fixed-size header at the start of every swap file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SwapHeader {
    compression: SwapCompression,
    key: TileKey,
    raw_len: u64,
    stored_len: u64,
}

impl SwapHeader {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&SWAP_MAGIC);
        buf[4] = SWAP_VERSION;
        buf[5] = self.compression.tag();
        buf[8..12].copy_from_slice(&self.key.owner.0.to_le_bytes());
        buf[12..16].copy_from_slice(&self.key.x.to_le_bytes());
        buf[16..20].copy_from_slice(&self.key.y.to_le_bytes());
        buf[20..28].copy_from_slice(&self.raw_len.to_le_bytes());
        buf[28..36].copy_from_slice(&self.stored_len.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::CorruptSwapFile(format!(
                "header truncated to {} bytes",
                buf.len()
            )));
        }
        if buf[0..4] != SWAP_MAGIC {
            return Err(Error::CorruptSwapFile("bad magic".to_string()));
        }
        if buf[4] != SWAP_VERSION {
            return Err(Error::Unsupported(format!("Swap file version {}", buf[4])));
        }

        Ok(Self {
            compression: SwapCompression::from_tag(buf[5])?,
            key: TileKey::new(
                OwnerId(read_u32(buf, 8)),
                read_u32(buf, 12),
                read_u32(buf, 16),
            ),
            raw_len: read_u64(buf, 20),
            stored_len: read_u64(buf, 28),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Swap space writing one file per tile into a directory
pub struct DiskSwapSpace {
    directory: PathBuf,
    compression: SwapCompression,
}

impl DiskSwapSpace {
    /// Opens (creating if needed) a swap directory without compression
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        Self::with_compression(directory, SwapCompression::None)
    }

    /// Opens (creating if needed) a swap directory with the given compression
    pub fn with_compression<P: AsRef<Path>>(directory: P, compression: SwapCompression) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        debug!(
            dir = %directory.display(),
            compression = compression.name(),
            "Opened disk swap space"
        );

        Ok(Self {
            directory,
            compression,
        })
    }

    /// Opens a per-process swap directory under the system temp directory
    pub fn in_temp_dir(compression: SwapCompression) -> Result<Self> {
        Self::with_compression(Self::default_directory(), compression)
    }

    /// Per-process default swap directory
    pub fn default_directory() -> PathBuf {
        std::env::temp_dir().join(format!("tileswap-{}", std::process::id()))
    }

    /// Returns the swap directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the compression used for new swap files
    pub fn compression(&self) -> SwapCompression {
        self.compression
    }

    /// Path of the swap file for a tile
    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.directory.join(format!(
            "{}{}-{}-{}.{}",
            FILE_PREFIX, key.owner, key.x, key.y, FILE_EXTENSION
        ))
    }

    /// Writes a tile to its swap file
    pub fn write_tile(&self, tile: &MemoryTile) -> Result<()> {
        let key = tile.key();
        let payload = self.compression.compress(tile.data())?;
        let header = SwapHeader {
            compression: self.compression,
            key,
            raw_len: tile.size(),
            stored_len: payload.len() as u64,
        };

        let path = self.tile_path(&key);
        let tmp_path = path.with_extension("swp.tmp");

        let written = (|| -> io::Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&header.encode())?;
            writer.write_all(&payload)?;
            writer.flush()?;
            fs::rename(&tmp_path, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        Ok(())
    }

    /// Reads a tile from its swap file; `Ok(None)` if there is none
    pub fn read_tile(&self, key: &TileKey) -> Result<Option<MemoryTile>> {
        let file = match File::open(self.tile_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mmap = unsafe { Mmap::map(&file)? };
        let header = SwapHeader::decode(&mmap)?;

        if header.key != *key {
            return Err(Error::KeyMismatch {
                expected: *key,
                found: header.key,
            });
        }

        let body = &mmap[HEADER_LEN..];
        if body.len() as u64 != header.stored_len {
            return Err(Error::CorruptSwapFile(format!(
                "{}: expected {} payload bytes, found {}",
                key,
                header.stored_len,
                body.len()
            )));
        }

        let raw_len = usize::try_from(header.raw_len).map_err(|_| {
            Error::CorruptSwapFile(format!("{}: raw length {} out of range", key, header.raw_len))
        })?;
        let data = header.compression.decompress(body, raw_len)?;
        Ok(Some(MemoryTile::new(*key, Arc::new(data))))
    }

    /// Lists the swap files in the directory
    fn swap_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let is_swap_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(FILE_PREFIX))
                .unwrap_or(false)
                && path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION);
            if is_swap_file {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Number of tiles currently stored
    pub fn tile_count(&self) -> Result<usize> {
        Ok(self.swap_files()?.len())
    }

    /// Deletes every swap file and returns how many were removed
    pub fn clear(&self) -> Result<usize> {
        let files = self.swap_files()?;
        for path in &files {
            fs::remove_file(path)?;
        }
        Ok(files.len())
    }
}

impl SwapSpace for DiskSwapSpace {
    fn contains_tile(&self, key: &TileKey) -> bool {
        self.tile_path(key).is_file()
    }

    fn store_tile(&self, tile: &MemoryTile) -> bool {
        match self.write_tile(tile) {
            Ok(()) => true,
            Err(e) => {
                warn!(tile = %tile.key(), error = %e, "Failed to write swap file");
                false
            }
        }
    }

    fn restore_tile(&self, key: &TileKey) -> Option<MemoryTile> {
        match self.read_tile(key) {
            Ok(tile) => tile,
            Err(e) => {
                warn!(tile = %key, error = %e, "Failed to read swap file");
                None
            }
        }
    }

    fn delete_tile(&self, key: &TileKey) -> bool {
        match fs::remove_file(self.tile_path(key)) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(tile = %key, error = %e, "Failed to delete swap file");
                false
            }
        }
    }
}

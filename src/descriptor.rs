// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Persistent pool descriptor: encode/decode and CRC-check.
//!
//! The descriptor is a small JSON dictionary padded to a fixed size on
//! disk, but its `crc` field is computed over a bit-exact binary layout
//! (magic || chunkSize || metaPageSize || [blockSize] || filePoolPath) so
//! that any implementation reading the same bytes agrees on the checksum.

use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::fs::FileSystem;

/// 8-byte magic prefixed to the CRC input.
pub const MAGIC: &[u8; 8] = b"FILEPOOL";

/// Fixed on-disk size of the descriptor file.
pub const PERSIST_SIZE: usize = 4096;

/// Alignment hint used when an older descriptor omits `blockSize`.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

const KEY_CHUNK_SIZE: &str = "chunkSize";
const KEY_META_PAGE_SIZE: &str = "metaPageSize";
const KEY_BLOCK_SIZE: &str = "blockSize";
const KEY_FILE_POOL_PATH: &str = "chunkfilepool_path";
const KEY_CRC: &str = "crc";

/// In-memory form of the persistent pool descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDescriptor {
    pub chunk_size: u32,
    pub meta_page_size: u32,
    pub block_size: Option<u32>,
    pub file_pool_path: PathBuf,
}

/// Wire representation used only for (de)serialization.
#[derive(Serialize, Deserialize)]
struct DescriptorJson {
    #[serde(rename = "chunkSize")]
    chunk_size: u32,
    #[serde(rename = "metaPageSize")]
    meta_page_size: u32,
    #[serde(rename = "blockSize", skip_serializing_if = "Option::is_none")]
    block_size: Option<u32>,
    #[serde(rename = "chunkfilepool_path")]
    file_pool_path: String,
    crc: u32,
}

impl PoolDescriptor {
    /// Compute the CRC-32 over the canonical binary layout.
    ///
    /// When `block_size` is absent, the field is omitted from the CRC input
    /// entirely — not zero-padded — matching the original implementation's
    /// `FilePoolMeta::Crc32` bit for bit.
    pub fn crc32(&self) -> u32 {
        let mut buf = Vec::with_capacity(
            MAGIC.len() + 4 + 4 + 4 + self.file_pool_path.as_os_str().len(),
        );
        buf.extend_from_slice(MAGIC);
        buf.write_u32::<LittleEndian>(self.chunk_size).unwrap();
        buf.write_u32::<LittleEndian>(self.meta_page_size).unwrap();
        if let Some(block_size) = self.block_size {
            buf.write_u32::<LittleEndian>(block_size).unwrap();
        }
        buf.extend_from_slice(self.file_pool_path.as_os_str().as_encoded_bytes());
        crc32fast::hash(&buf)
    }

    /// Encode the descriptor into a zero-padded 4096-byte blob.
    pub fn encode(&self) -> Vec<u8> {
        let wire = DescriptorJson {
            chunk_size: self.chunk_size,
            meta_page_size: self.meta_page_size,
            block_size: self.block_size,
            file_pool_path: self.file_pool_path.display().to_string(),
            crc: self.crc32(),
        };
        let text = serde_json::to_vec(&wire).expect("descriptor always serializable");
        assert!(text.len() <= PERSIST_SIZE, "descriptor exceeds persist size");
        let mut padded = vec![0u8; PERSIST_SIZE];
        padded[..text.len()].copy_from_slice(&text);
        padded
    }

    /// Decode a descriptor blob, validating the CRC.
    ///
    /// Returns `(descriptor, warning)` where `warning` is `Some(msg)` when
    /// `blockSize` was absent and the compile-time default was substituted.
    pub fn decode(bytes: &[u8]) -> Result<(Self, Option<String>)> {
        let text_len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let wire: DescriptorJson = serde_json::from_slice(&bytes[..text_len])
            .map_err(|e| PoolError::DescriptorInvalid(format!("malformed descriptor: {e}")))?;

        let (block_size, warning) = match wire.block_size {
            Some(bs) => (Some(bs), None),
            None => (
                None,
                Some(format!(
                    "descriptor missing `{KEY_BLOCK_SIZE}`, using default {DEFAULT_BLOCK_SIZE}"
                )),
            ),
        };

        let meta = PoolDescriptor {
            chunk_size: wire.chunk_size,
            meta_page_size: wire.meta_page_size,
            block_size,
            file_pool_path: PathBuf::from(wire.file_pool_path),
        };

        let recomputed = meta.crc32();
        if recomputed != wire.crc {
            return Err(PoolError::DescriptorInvalid(format!(
                "crc mismatch: stored {:#010x}, recomputed {:#010x}",
                wire.crc, recomputed
            )));
        }

        Ok((meta, warning))
    }

    /// Resolved block size: the descriptor's value, or the compile-time
    /// default when absent.
    pub fn block_size_or_default(&self) -> u32 {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }
}

/// Persist `meta` to `path` with `O_SYNC`, padded to [`PERSIST_SIZE`].
pub fn persist(fs: &dyn FileSystem, meta: &PoolDescriptor, path: &Path) -> Result<()> {
    fs.write_sync(path, &meta.encode())
}

/// Load and CRC-check the descriptor at `path`.
pub fn load(fs: &dyn FileSystem, path: &Path, meta_file_size: u32) -> Result<(PoolDescriptor, Option<String>)> {
    let bytes = fs.read_all(path, meta_file_size as usize)?;
    PoolDescriptor::decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolDescriptor {
        PoolDescriptor {
            chunk_size: 16 * 1024 * 1024,
            meta_page_size: 4096,
            block_size: Some(4096),
            file_pool_path: PathBuf::from("/data/pool"),
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let meta = sample();
        let bytes = meta.encode();
        let (decoded, warning) = PoolDescriptor::decode(&bytes).expect("decode");
        assert_eq!(decoded, meta);
        assert!(warning.is_none());
    }

    #[test]
    fn missing_block_size_defaults_with_warning() {
        let mut meta = sample();
        meta.block_size = None;
        let bytes = meta.encode();
        let (decoded, warning) = PoolDescriptor::decode(&bytes).expect("decode");
        assert_eq!(decoded.block_size, None);
        assert_eq!(decoded.block_size_or_default(), DEFAULT_BLOCK_SIZE);
        assert!(warning.is_some());
    }

    #[test]
    fn crc_mismatch_is_rejected() {
        let meta = sample();
        let mut bytes = meta.encode();
        // Flip one byte within the JSON text, leaving the stored crc stale.
        bytes[10] ^= 0xFF;
        let err = PoolDescriptor::decode(&bytes).unwrap_err();
        assert!(matches!(err, PoolError::DescriptorInvalid(_)));
    }

    #[test]
    fn encode_is_padded_to_persist_size() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), PERSIST_SIZE);
    }
}

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Startup scan of the pool directory, rebuilding the [`Inventory`].

use std::path::Path;

use tracing::{info, warn};

use crate::error::{PoolError, Result};
use crate::fs::FileSystem;
use crate::inventory::{Inventory, Kind};

pub const CLEAN_SUFFIX: &str = ".clean";

/// Split a directory entry name into `(numeric id string, is_clean)`.
pub(crate) fn split_suffix(name: &str) -> (&str, bool) {
    match name.strip_suffix(CLEAN_SUFFIX) {
        Some(stripped) => (stripped, true),
        None => (name, false),
    }
}

/// Parse a chunk filename's numeric component; any non-digit character
/// anywhere in the stem is an illegal name.
pub fn parse_chunk_id(stem: &str) -> Result<u64> {
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PoolError::DirIllegalContent(format!("illegal name: {stem}")));
    }
    stem.parse::<u64>()
        .map_err(|_| PoolError::DirIllegalContent(format!("illegal name: {stem}")))
}

/// Validate a single pool-directory entry against the expected chunk
/// length, returning its id and clean/dirty status. Used by both the
/// Scanner and the Formatter's `CheckPoolFile`.
pub fn check_pool_file(fs: &dyn FileSystem, dir: &Path, name: &str, chunk_len: u64) -> Result<(u64, bool)> {
    let (stem, is_clean) = split_suffix(name);
    let id = parse_chunk_id(stem)?;

    let path = dir.join(name);
    if !fs.file_exists(&path) {
        return Err(PoolError::DirIllegalContent(format!(
            "pool dir has subdirectory or missing entry: {name}"
        )));
    }

    let size = fs.file_len(&path)?;
    if size != chunk_len {
        return Err(PoolError::DirIllegalContent(format!(
            "file size illegal for {name}: expected {chunk_len}, got {size}"
        )));
    }

    Ok((id, is_clean))
}

/// Enumerate `dir` and seed `inventory` from whatever is on disk.
///
/// Fails startup on the first illegal filename, subdirectory, or
/// wrong-sized file (spec invariant: never silently repaired).
pub fn scan(fs: &dyn FileSystem, dir: &Path, chunk_len: u64, inventory: &Inventory) -> Result<()> {
    let entries = fs.list(dir)?;
    info!(dir = %dir.display(), entries = entries.len(), "scanning pool directory");

    let mut maxnum = 0u64;
    for name in &entries {
        let (id, is_clean) = check_pool_file(fs, dir, name, chunk_len)?;
        if id == 0 {
            warn!("ignoring reserved sentinel id 0 found in pool directory");
            continue;
        }
        inventory.seed(if is_clean { Kind::Clean } else { Kind::Dirty }, id);
        maxnum = maxnum.max(id);
    }
    inventory.set_next_id_floor(maxnum);

    let snap = inventory.snapshot();
    info!(pool_size = snap.preallocated_left, "scan complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::UnixFileSystem;
    use tempfile::tempdir;

    fn write_chunk(dir: &Path, name: &str, len: u64) {
        std::fs::write(dir.join(name), vec![0u8; len as usize]).unwrap();
    }

    #[test]
    fn scans_dirty_and_clean_entries() {
        let dir = tempdir().unwrap();
        write_chunk(dir.path(), "1", 100);
        write_chunk(dir.path(), "2.clean", 100);
        write_chunk(dir.path(), "0", 100); // reserved, ignored

        let fs = UnixFileSystem;
        let inventory = Inventory::new(100, 0, 4096);
        scan(&fs, dir.path(), 100, &inventory).unwrap();

        let snap = inventory.snapshot();
        assert_eq!(snap.dirty_left, 1);
        assert_eq!(snap.clean_left, 1);
        assert_eq!(inventory.bump_next_id(), 3);
    }

    #[test]
    fn rejects_illegal_filename() {
        let dir = tempdir().unwrap();
        write_chunk(dir.path(), "abc", 100);
        let fs = UnixFileSystem;
        let inventory = Inventory::new(100, 0, 4096);
        let err = scan(&fs, dir.path(), 100, &inventory).unwrap_err();
        assert!(matches!(err, PoolError::DirIllegalContent(_)));
    }

    #[test]
    fn rejects_wrong_sized_file() {
        let dir = tempdir().unwrap();
        write_chunk(dir.path(), "1", 50);
        let fs = UnixFileSystem;
        let inventory = Inventory::new(100, 0, 4096);
        let err = scan(&fs, dir.path(), 100, &inventory).unwrap_err();
        assert!(matches!(err, PoolError::DirIllegalContent(_)));
    }
}

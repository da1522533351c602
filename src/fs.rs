// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Abstract local-filesystem collaborator.
//!
//! Every syscall the pool core needs — open/read/write/fsync/fallocate/
//! rename/stat/list/delete/mkdir/exists/statfs — goes through this trait
//! so the rest of the crate never touches `std::fs` or `libc` directly.
//! [`UnixFileSystem`] is the only implementation; tests use it against a
//! [`tempfile::TempDir`] rather than mocking it, since the pool's
//! correctness hinges on real fallocate/rename semantics.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{PoolError, Result};

/// Disk usage summary for a filesystem, as returned by `statfs`.
#[derive(Debug, Clone, Copy)]
pub struct FsStat {
    pub total: u64,
    pub available: u64,
}

/// A handle to an open chunk/descriptor file.
pub struct PoolFile {
    file: File,
    path: PathBuf,
}

impl PoolFile {
    /// Reserve `len` bytes starting at `offset`, extending the file if
    /// needed. Fails the caller's allocation step on any syscall error.
    pub fn fallocate(&self, offset: i64, len: i64) -> Result<()> {
        self.fallocate_mode(0, offset, len)
    }

    /// Zero `len` bytes starting at `offset` using the kernel fast path
    /// (`FALLOC_FL_ZERO_RANGE`), without an explicit write pass.
    pub fn fallocate_zero_range(&self, offset: i64, len: i64) -> Result<()> {
        self.fallocate_mode(libc::FALLOC_FL_ZERO_RANGE, offset, len)
    }

    fn fallocate_mode(&self, mode: i32, offset: i64, len: i64) -> Result<()> {
        // Safe: fd is valid for the lifetime of `self`, mode/offset/len are
        // plain integers, and the return value is checked below.
        let ret = unsafe { libc::fallocate(self.file.as_raw_fd(), mode, offset, len) };
        if ret != 0 {
            return Err(PoolError::AllocationFailure {
                path: self.path.display().to_string(),
                reason: format!("fallocate failed: {}", std::io::Error::last_os_error()),
            });
        }
        Ok(())
    }

    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(data.len())
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn fsync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Abstract local-filesystem operations used by every pool component.
pub trait FileSystem: Send + Sync {
    fn mkdir(&self, path: &Path) -> Result<()>;
    fn dir_exists(&self, path: &Path) -> bool;
    fn file_exists(&self, path: &Path) -> bool;
    fn list(&self, dir: &Path) -> Result<Vec<String>>;
    fn delete(&self, path: &Path) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path, no_replace: bool) -> Result<()>;
    fn file_len(&self, path: &Path) -> Result<u64>;
    fn statfs(&self, path: &Path) -> Result<FsStat>;
    /// Open, creating the file if it doesn't exist.
    fn open_rw_create(&self, path: &Path) -> Result<PoolFile>;
    /// Open an existing file for read-write.
    fn open_rw(&self, path: &Path) -> Result<PoolFile>;
    /// Write `data`, truncating to exactly `data.len()`, with `O_SYNC`.
    fn write_sync(&self, path: &Path, data: &[u8]) -> Result<()>;
    /// Read exactly `len` bytes from the start of the file.
    fn read_all(&self, path: &Path, len: usize) -> Result<Vec<u8>>;
}

/// The only [`FileSystem`] implementation: real Unix syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixFileSystem;

impl FileSystem for UnixFileSystem {
    fn mkdir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path, no_replace: bool) -> Result<()> {
        if no_replace && to.exists() {
            return Err(PoolError::AlreadyExists(to.display().to_string()));
        }
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn statfs(&self, path: &Path) -> Result<FsStat> {
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| PoolError::Io(std::io::Error::from(std::io::ErrorKind::InvalidInput)))?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        // Safe: c_path is NUL-terminated and stat is a valid out-pointer.
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(PoolError::Io(std::io::Error::last_os_error()));
        }
        let frsize = stat.f_frsize as u64;
        Ok(FsStat {
            total: stat.f_blocks as u64 * frsize,
            available: stat.f_bavail as u64 * frsize,
        })
    }

    fn open_rw_create(&self, path: &Path) -> Result<PoolFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path)?;
        Ok(PoolFile { file, path: path.to_path_buf() })
    }

    fn open_rw(&self, path: &Path) -> Result<PoolFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(PoolFile { file, path: path.to_path_buf() })
    }

    fn write_sync(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn read_all(&self, path: &Path, len: usize) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

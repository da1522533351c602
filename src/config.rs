// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Pool configuration, loaded from a TOML file or built programmatically.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::descriptor::DEFAULT_BLOCK_SIZE;
use crate::error::{PoolError, Result};

/// Options controlling one [`crate::pool::Pool`] instance.
///
/// Mirrors the enumerated configuration surface in the specification: pool
/// mode vs. pass-through, file geometry, target population, and the
/// cleaner's throttle.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoolOptions {
    /// Preallocation (pool) mode vs. pass-through allocation.
    pub get_file_from_pool: bool,

    /// Directory holding the preallocated chunk files.
    pub file_pool_dir: PathBuf,

    /// Path of the persistent pool descriptor.
    pub meta_path: PathBuf,

    /// On-disk size of the descriptor file (padded with zeros).
    #[serde(default = "default_meta_file_size")]
    pub meta_file_size: u32,

    /// Payload bytes per chunk file.
    pub file_size: u32,

    /// Metadata-page bytes stored before the payload in each chunk file.
    pub meta_page_size: u32,

    /// Alignment hint; overridden by the descriptor when present.
    #[serde(default = "default_block_size")]
    pub block_size: u32,

    /// Size target by percentage of total filesystem space instead of a
    /// fixed file count.
    #[serde(default)]
    pub allocate_by_percent: bool,

    /// Percentage of total filesystem space to reserve when
    /// `allocate_by_percent` is set.
    #[serde(default)]
    pub allocate_percent: u8,

    /// Target population when `allocate_by_percent` is not set.
    #[serde(default)]
    pub pre_allocate_num: u64,

    /// Write slice size used by the Formatter and Cleaner.
    #[serde(default = "default_bytes_per_write")]
    pub bytes_per_write: u32,

    /// `GetFile` retry budget.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,

    /// Whether the background cleaner should run.
    #[serde(default)]
    pub need_clean: bool,

    /// IOPS throttle applied to the cleaner's write pass.
    #[serde(default = "default_iops4clean")]
    pub iops4clean: u32,

    /// Minimum preallocated population before `Initialize` may return.
    #[serde(default = "default_min_chunk_file_num")]
    pub min_chunk_file_num: u64,

    /// Number of Formatter worker threads.
    #[serde(default = "default_format_worker_threads")]
    pub format_worker_threads: usize,
}

fn default_meta_file_size() -> u32 {
    4096
}

fn default_block_size() -> u32 {
    DEFAULT_BLOCK_SIZE
}

fn default_bytes_per_write() -> u32 {
    1024 * 1024
}

fn default_retry_times() -> u32 {
    3
}

fn default_iops4clean() -> u32 {
    100
}

fn default_min_chunk_file_num() -> u64 {
    1
}

fn default_format_worker_threads() -> usize {
    2
}

impl PoolOptions {
    /// Load pool options from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let opts: PoolOptions = toml::from_str(&content)
            .map_err(|e| PoolError::DescriptorInvalid(format!("invalid config TOML: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    fn validate(&self) -> Result<()> {
        if self.file_size == 0 {
            return Err(PoolError::DescriptorInvalid("file_size must be > 0".into()));
        }
        if self.get_file_from_pool && !self.allocate_by_percent && self.pre_allocate_num == 0 {
            return Err(PoolError::DescriptorInvalid(
                "pre_allocate_num must be > 0 unless allocate_by_percent is set".into(),
            ));
        }
        if self.allocate_by_percent && self.allocate_percent == 0 {
            return Err(PoolError::DescriptorInvalid(
                "allocate_percent must be > 0 when allocate_by_percent is set".into(),
            ));
        }
        Ok(())
    }

    /// Bytes per chunk file, payload plus metadata page.
    pub fn chunk_len(&self) -> u64 {
        self.file_size as u64 + self.meta_page_size as u64
    }
}

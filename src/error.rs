// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("descriptor invalid: {0}")]
    DescriptorInvalid(String),

    #[error("pool directory has illegal content: {0}")]
    DirIllegalContent(String),

    #[error("insufficient free space: need {needed} bytes, have {available} bytes")]
    InsufficientSpace { needed: u64, available: u64 },

    #[error("allocation failed for {path}: {reason}")]
    AllocationFailure { path: String, reason: String },

    #[error("pool is empty")]
    PoolEmpty,

    #[error("target path already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Never surfaced across the Pool API; observed only by background loops.
    #[error("stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, PoolError>;

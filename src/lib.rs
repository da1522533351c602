// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

pub mod cleaner;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod formatter;
pub mod fs;
pub mod inventory;
pub mod pool;
pub mod scanner;
pub mod throttle;

pub use config::PoolOptions;
pub use error::{PoolError, Result};
pub use fs::{FileSystem, UnixFileSystem};
pub use inventory::PoolState;
pub use pool::Pool;

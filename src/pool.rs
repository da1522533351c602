// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The Pool API: ties the descriptor, inventory, scanner, formatter and
//! cleaner together into the surface chunk-server code actually calls.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cleaner::Cleaner;
use crate::config::PoolOptions;
use crate::descriptor::{self, PoolDescriptor};
use crate::error::{PoolError, Result};
use crate::formatter::{self, FormatHandle};
use crate::fs::FileSystem;
use crate::inventory::{Inventory, Kind, PoolState};
use crate::scanner;

/// Outcome of a single `prepare_and_move` attempt, distinguishing the one
/// failure mode (`NoRequeue`) that must not send the popped id back onto
/// its deque from the ordinary retryable ones.
enum GetFileOutcome {
    Ok,
    AlreadyExists(String),
    NoRequeue(PoolError),
    Retryable(PoolError),
}

/// A chunk-server-local preallocation and recycling pool.
pub struct Pool {
    fs: Arc<dyn FileSystem>,
    options: PoolOptions,
    inventory: Arc<Inventory>,
    format_handle: Option<FormatHandle>,
    cleaner: Option<Cleaner>,
    initialized: bool,
}

impl Pool {
    pub fn new(fs: Arc<dyn FileSystem>, options: PoolOptions) -> Self {
        let inventory = Arc::new(Inventory::new(
            options.file_size,
            options.meta_page_size,
            options.block_size,
        ));
        Self { fs, options, inventory, format_handle: None, cleaner: None, initialized: false }
    }

    /// Bring the pool to a ready state: validate/create the descriptor,
    /// scan the directory, and grow to the configured population.
    pub fn initialize(&mut self) -> Result<()> {
        self.fs.mkdir(&self.options.file_pool_dir)?;

        if !self.options.get_file_from_pool {
            info!("pool running in pass-through mode, skipping descriptor/format");
            self.initialized = true;
            return Ok(());
        }

        self.load_or_create_descriptor()?;

        let chunk_len = self.options.chunk_len();
        scanner::scan(self.fs.as_ref(), &self.options.file_pool_dir, chunk_len, &self.inventory)?;

        let existing = self.inventory.snapshot().preallocated_left;
        let target = formatter::compute_target(
            self.fs.as_ref(),
            &self.options.file_pool_dir,
            self.options.bytes_per_write as u64,
            existing,
            self.options.allocate_by_percent,
            self.options.allocate_percent,
            self.options.pre_allocate_num,
        )?;

        if target > existing {
            let (handle, ready) = formatter::spawn(
                self.fs.clone(),
                self.options.file_pool_dir.clone(),
                chunk_len,
                self.options.bytes_per_write,
                self.options.format_worker_threads,
                target,
                self.options.min_chunk_file_num,
                self.inventory.clone(),
            );
            ready.wait()?;
            self.format_handle = Some(handle);
        } else {
            info!(existing, target, "pool already at or above target population");
        }

        self.initialized = true;
        Ok(())
    }

    fn load_or_create_descriptor(&self) -> Result<()> {
        if self.fs.file_exists(&self.options.meta_path) {
            let (meta, warning) =
                descriptor::load(self.fs.as_ref(), &self.options.meta_path, self.options.meta_file_size)?;
            if let Some(warning) = warning {
                warn!(%warning, "loaded pool descriptor with defaulted field");
            }
            if meta.chunk_size != self.options.file_size || meta.meta_page_size != self.options.meta_page_size {
                return Err(PoolError::DescriptorInvalid(format!(
                    "descriptor geometry {}x{} does not match configured {}x{}",
                    meta.chunk_size, meta.meta_page_size, self.options.file_size, self.options.meta_page_size
                )));
            }
        } else {
            let meta = PoolDescriptor {
                chunk_size: self.options.file_size,
                meta_page_size: self.options.meta_page_size,
                block_size: Some(self.options.block_size),
                file_pool_path: self.options.file_pool_dir.clone(),
            };
            descriptor::persist(self.fs.as_ref(), &meta, &self.options.meta_path)?;
        }
        Ok(())
    }

    /// Produce a ready-to-use chunk file at `target_path`, with
    /// `meta_page` already written at its head.
    pub fn get_file(&self, target_path: &Path, meta_page: &[u8], need_clean: bool) -> Result<()> {
        debug_assert!(self.initialized, "get_file called before initialize");
        if !self.options.get_file_from_pool {
            return self.allocate_fresh(target_path, meta_page);
        }

        let chunk_len = self.options.chunk_len();
        let mut last_err = None;
        for _ in 0..self.options.retry_times.max(1) {
            // §4.7 step 1: needClean==false prefers a dirty chunk (saving
            // clean ones for consumers that actually need them); needClean
            // ==true prefers a clean chunk and only falls back to dirty.
            let (id, was_dirty) = if need_clean {
                match self.inventory.pop(Kind::Clean) {
                    Some(id) => (id, false),
                    None => match self.inventory.pop(Kind::Dirty) {
                        Some(id) => (id, true),
                        None => return Err(PoolError::PoolEmpty),
                    },
                }
            } else {
                match self.inventory.pop(Kind::Dirty) {
                    Some(id) => (id, true),
                    None => match self.inventory.pop(Kind::Clean) {
                        Some(id) => (id, false),
                        None => return Err(PoolError::PoolEmpty),
                    },
                }
            };

            let source = self.options.file_pool_dir.join(format!("{id}{}", if was_dirty { "" } else { ".clean" }));
            match self.prepare_and_move(&source, target_path, chunk_len, meta_page, was_dirty, need_clean) {
                GetFileOutcome::Ok => return Ok(()),
                GetFileOutcome::AlreadyExists(path) => {
                    // The source file is left on disk, untouched; the id is
                    // simply dropped from the inventory rather than requeued.
                    return Err(PoolError::AlreadyExists(path));
                }
                GetFileOutcome::NoRequeue(e) => {
                    // needClean==true's dirty-chunk zero-fill failed: surface
                    // the error directly rather than requeuing a chunk whose
                    // zero-fill is in an unknown state.
                    warn!(error = %e, id, "dirty chunk zero-fill failed, not requeued");
                    return Err(e);
                }
                GetFileOutcome::Retryable(e) => {
                    warn!(error = %e, id, "get_file attempt failed, retrying with another id");
                    self.inventory.push(if was_dirty { Kind::Dirty } else { Kind::Clean }, id);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(PoolError::PoolEmpty))
    }

    fn prepare_and_move(
        &self,
        source: &Path,
        target_path: &Path,
        chunk_len: u64,
        meta_page: &[u8],
        was_dirty: bool,
        need_clean: bool,
    ) -> GetFileOutcome {
        let mut file = match self.fs.open_rw(source) {
            Ok(f) => f,
            Err(e) => return GetFileOutcome::Retryable(e),
        };

        if was_dirty && need_clean {
            if let Err(e) = file.fallocate_zero_range(0, chunk_len as i64) {
                return GetFileOutcome::NoRequeue(e);
            }
            if let Err(e) = file.fsync() {
                return GetFileOutcome::NoRequeue(e);
            }
        }

        if !meta_page.is_empty() {
            if let Err(e) = file.write_at(0, meta_page) {
                return GetFileOutcome::Retryable(e);
            }
            if let Err(e) = file.fsync() {
                return GetFileOutcome::Retryable(e);
            }
        }

        drop(file);
        match self.fs.rename(source, target_path, true) {
            Ok(()) => GetFileOutcome::Ok,
            Err(PoolError::AlreadyExists(path)) => GetFileOutcome::AlreadyExists(path),
            Err(e) => GetFileOutcome::Retryable(e),
        }
    }

    fn allocate_fresh(&self, target_path: &Path, meta_page: &[u8]) -> Result<()> {
        formatter::allocate_chunk(self.fs.as_ref(), target_path, self.options.chunk_len(), self.options.bytes_per_write)?;
        if !meta_page.is_empty() {
            let mut file = self.fs.open_rw(target_path)?;
            file.write_at(0, meta_page)?;
            file.fsync()?;
        }
        Ok(())
    }

    /// Return `path` to the pool (or delete it, outside pool mode).
    pub fn recycle_file(&self, path: &Path) -> Result<()> {
        if !self.options.get_file_from_pool {
            return self.fs.delete(path);
        }

        let chunk_len = self.options.chunk_len();
        let size = self.fs.file_len(path)?;
        if size != chunk_len {
            warn!(path = %path.display(), size, chunk_len, "recycled file has wrong size, deleting instead");
            return self.fs.delete(path);
        }

        let id = self.inventory.bump_next_id();
        let dest = self.options.file_pool_dir.join(id.to_string());
        self.fs.rename(path, &dest, true)?;
        self.inventory.push(Kind::Dirty, id);
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.inventory.preallocated_left()
    }

    pub fn get_state(&self) -> PoolState {
        self.inventory.snapshot()
    }

    /// Start the background cleaner, if configured and not already running.
    pub fn start_cleaning(&mut self) {
        if !self.options.need_clean || !self.options.get_file_from_pool || self.cleaner.is_some() {
            return;
        }
        self.cleaner = Some(Cleaner::start(
            self.fs.clone(),
            self.options.file_pool_dir.clone(),
            self.options.chunk_len(),
            self.options.bytes_per_write,
            self.inventory.clone(),
            self.options.iops4clean,
        ));
    }

    /// Stop the background cleaner. Idempotent.
    pub fn stop_cleaning(&mut self) {
        if let Some(mut cleaner) = self.cleaner.take() {
            cleaner.stop();
        }
    }

    /// Tear the pool down: stops the cleaner if still running and clears
    /// the inventory. The pool must be re-`initialize`d before further use.
    pub fn uninitialize(&mut self) {
        self.stop_cleaning();
        if let Some(handle) = self.format_handle.take() {
            handle.join();
        }
        self.inventory.clear();
        self.initialized = false;
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.stop_cleaning();
    }
}

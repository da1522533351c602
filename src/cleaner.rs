// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Cleaner: background thread that zero-fills dirty chunk files and
//! promotes them to clean, throttled by [`Throttle`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::fs::FileSystem;
use crate::inventory::{Inventory, Kind};
use crate::throttle::Throttle;

const IDLE_INTERVAL: Duration = Duration::from_millis(100);
const SUCCESS_INTERVAL: Duration = Duration::from_millis(10);
const FAIL_INTERVAL: Duration = Duration::from_millis(500);

/// Zero-fill `path` in `bytes_per_write` slices, fsyncing and consuming
/// throttle tokens once per slice.
fn clean_one(
    fs: &dyn FileSystem,
    path: &Path,
    chunk_len: u64,
    bytes_per_write: u32,
    throttle: &Throttle,
    stop: &AtomicBool,
) -> Result<()> {
    let mut file = fs.open_rw(path)?;
    let slice_len = bytes_per_write.max(1) as u64;
    let zeros = vec![0u8; slice_len.min(chunk_len).max(1) as usize];

    let mut written = 0u64;
    while written < chunk_len {
        if stop.load(Ordering::Acquire) {
            return Err(crate::error::PoolError::Stopped);
        }
        let n = slice_len.min(chunk_len - written) as usize;
        if !throttle.consume(n as u64) {
            return Err(crate::error::PoolError::Stopped);
        }
        file.write_at(written, &zeros[..n])?;
        file.fsync()?;
        written += n as u64;
    }
    Ok(())
}

fn worker(
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    chunk_len: u64,
    bytes_per_write: u32,
    inventory: Arc<Inventory>,
    throttle: Arc<Throttle>,
    stop: Arc<AtomicBool>,
) {
    info!("cleaner started");
    while !stop.load(Ordering::Acquire) {
        let Some(id) = inventory.pop(Kind::Dirty) else {
            thread::sleep(IDLE_INTERVAL);
            continue;
        };

        let dirty_path = dir.join(id.to_string());
        let clean_path = dir.join(format!("{id}.clean"));

        let outcome = clean_one(fs.as_ref(), &dirty_path, chunk_len, bytes_per_write, &throttle, &stop)
            .and_then(|_| fs.rename(&dirty_path, &clean_path, true));

        match outcome {
            Ok(()) => {
                inventory.push(Kind::Clean, id);
                debug!(id, "chunk cleaned");
                thread::sleep(SUCCESS_INTERVAL);
            }
            Err(crate::error::PoolError::Stopped) => {
                // Interrupted mid-clean: the id goes back to dirty untouched.
                inventory.push(Kind::Dirty, id);
                break;
            }
            Err(e) => {
                warn!(error = %e, id, "clean failed, re-enqueuing");
                inventory.push(Kind::Dirty, id);
                thread::sleep(FAIL_INTERVAL);
            }
        }
    }
    info!("cleaner stopped");
}

/// Handle to a running background cleaner.
pub struct Cleaner {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    throttle: Arc<Throttle>,
}

impl Cleaner {
    /// Spawn the background cleaning thread.
    pub fn start(
        fs: Arc<dyn FileSystem>,
        dir: PathBuf,
        chunk_len: u64,
        bytes_per_write: u32,
        inventory: Arc<Inventory>,
        iops4clean: u32,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let throttle = Arc::new(Throttle::new(iops4clean as u64 * bytes_per_write as u64));

        let thread_stop = stop.clone();
        let thread_throttle = throttle.clone();
        let thread = thread::spawn(move || {
            worker(fs, dir, chunk_len, bytes_per_write, inventory, thread_throttle, thread_stop);
        });

        Self { thread: Some(thread), stop, throttle }
    }

    /// Signal the background thread to stop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.throttle.interrupt();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::UnixFileSystem;
    use std::time::Instant;
    use tempfile::tempdir;

    #[test]
    fn cleans_a_dirty_chunk_and_promotes_it() {
        let dir = tempdir().unwrap();
        let chunk_len = 4096u64;
        std::fs::write(dir.path().join("1"), vec![0xAAu8; chunk_len as usize]).unwrap();

        let inventory = Arc::new(Inventory::new(chunk_len as u32, 0, 4096));
        inventory.seed(Kind::Dirty, 1);

        let fs: Arc<dyn FileSystem> = Arc::new(UnixFileSystem);
        let mut cleaner = Cleaner::start(fs, dir.path().to_path_buf(), chunk_len, 1024, inventory.clone(), 0);

        let start = Instant::now();
        while inventory.snapshot().clean_left == 0 && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(20));
        }
        cleaner.stop();

        assert_eq!(inventory.snapshot().clean_left, 1);
        assert_eq!(inventory.snapshot().dirty_left, 0);
        let cleaned = std::fs::read(dir.path().join("1.clean")).unwrap();
        assert!(cleaned.iter().all(|&b| b == 0));
    }

    #[test]
    fn stop_is_idempotent_and_reenqueues_interrupted_work() {
        let dir = tempdir().unwrap();
        let chunk_len = 1024u64 * 1024;
        std::fs::write(dir.path().join("1"), vec![0u8; chunk_len as usize]).unwrap();

        let inventory = Arc::new(Inventory::new(chunk_len as u32, 0, 4096));
        inventory.seed(Kind::Dirty, 1);

        let fs: Arc<dyn FileSystem> = Arc::new(UnixFileSystem);
        // A tiny IOPS budget keeps the worker mid-clean when we stop it.
        let mut cleaner = Cleaner::start(fs, dir.path().to_path_buf(), chunk_len, 4096, inventory.clone(), 1);
        thread::sleep(Duration::from_millis(20));
        cleaner.stop();
        cleaner.stop();

        let snap = inventory.snapshot();
        assert_eq!(snap.dirty_left + snap.clean_left, 1);
    }
}

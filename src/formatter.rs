// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Formatter: grows the pool to its target population using a fixed
//! worker-thread pool, driven by a background thread that `Initialize`
//! blocks on only until the minimum threshold is reached.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use crate::error::{PoolError, Result};
use crate::fs::FileSystem;
use crate::inventory::{Inventory, Kind};
use crate::scanner::{check_pool_file, parse_chunk_id, split_suffix, CLEAN_SUFFIX};

const DRIVER_TICK: Duration = Duration::from_millis(10);

/// Compute the Formatter's target population from disk usage, per
/// spec.md §4.5: the literal formula multiplies by `bytes_per_write`,
/// not `chunk_len` — this is carried over unchanged from the original
/// implementation's sizing pass.
pub fn compute_target(
    fs: &dyn FileSystem,
    dir: &Path,
    bytes_per_write: u64,
    existing_files: u64,
    allocate_by_percent: bool,
    allocate_percent: u8,
    pre_allocate_num: u64,
) -> Result<u64> {
    let stat = fs.statfs(dir)?;
    let need_space = if allocate_by_percent {
        allocate_percent as u64 * stat.total / 100
    } else {
        bytes_per_write * pre_allocate_num
    };
    let valid_space = stat.available + existing_files * bytes_per_write;
    if valid_space < need_space {
        return Err(PoolError::InsufficientSpace {
            needed: need_space,
            available: valid_space,
        });
    }
    Ok(need_space / bytes_per_write.max(1))
}

/// Preallocate one chunk file: create, reserve extents, zero-fill in
/// `bytes_per_write` slices, fsync, close.
pub fn allocate_chunk(fs: &dyn FileSystem, path: &Path, chunk_len: u64, bytes_per_write: u32) -> Result<()> {
    let mut file = fs.open_rw_create(path)?;
    file.fallocate(0, chunk_len as i64)?;

    let slice_len = bytes_per_write.max(1) as u64;
    let zeros = vec![0u8; slice_len.min(chunk_len).max(1) as usize];
    let mut written = 0u64;
    while written < chunk_len {
        let n = slice_len.min(chunk_len - written) as usize;
        file.write_at(written, &zeros[..n])?;
        written += n as u64;
    }
    file.fsync()?;
    Ok(())
}

#[derive(Default)]
struct ReadyState {
    min_reached: bool,
    failed: bool,
}

/// Shared handle `Pool::initialize` blocks on until the Formatter reaches
/// `min_chunk_file_num`, or fails outright.
pub struct FormatReady {
    state: Mutex<ReadyState>,
    cv: Condvar,
}

impl FormatReady {
    fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(ReadyState::default()), cv: Condvar::new() })
    }

    /// Block until the Formatter signals readiness or failure.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        while !state.min_reached && !state.failed {
            state = self.cv.wait(state).unwrap();
        }
        if state.failed {
            return Err(PoolError::AllocationFailure {
                path: "<format worker>".into(),
                reason: "formatting failed before reaching the minimum population".into(),
            });
        }
        Ok(())
    }

    fn signal_ready(&self) {
        let mut state = self.state.lock().unwrap();
        state.min_reached = true;
        self.cv.notify_all();
    }

    fn signal_failed(&self) {
        let mut state = self.state.lock().unwrap();
        state.failed = true;
        self.cv.notify_all();
    }
}

/// Handle to the background formatting thread, kept so `UnInitialize`
/// (or a test) can join it once formatting has run to completion.
pub struct FormatHandle {
    thread: JoinHandle<()>,
}

impl FormatHandle {
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Launch the Formatter in a detached background thread. Returns
/// immediately; callers that need to know when `Initialize` may proceed
/// should wait on the returned [`FormatReady`].
pub fn spawn(
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    chunk_len: u64,
    bytes_per_write: u32,
    worker_threads: usize,
    target: u64,
    min_chunk_file_num: u64,
    inventory: Arc<Inventory>,
) -> (FormatHandle, Arc<FormatReady>) {
    let ready = FormatReady::new();
    let ready_for_thread = ready.clone();

    let thread = thread::spawn(move || {
        run(
            fs.as_ref(),
            &dir,
            chunk_len,
            bytes_per_write,
            worker_threads,
            target,
            min_chunk_file_num,
            &inventory,
            &ready_for_thread,
        );
    });

    (FormatHandle { thread }, ready)
}

fn run(
    fs: &dyn FileSystem,
    dir: &Path,
    chunk_len: u64,
    bytes_per_write: u32,
    worker_threads: usize,
    target: u64,
    min_chunk_file_num: u64,
    inventory: &Inventory,
    ready: &FormatReady,
) {
    info!(format_target = target, worker_threads, "format worker start");

    // Id 0 is reserved and is never claimed by a worker: the claim
    // counter starts at 1, so `0.clean` is never created (resolves
    // spec.md's "id 0" open question).
    let present: Vec<AtomicBool> = (0..=target).map(|_| AtomicBool::new(false)).collect();
    // Ids already on disk (and already seeded into the inventory by
    // `scanner::scan` before the Formatter ever runs) must not be seeded a
    // second time once the driver walks past them below.
    let mut pre_existing = vec![false; target as usize + 1];
    let mut existing = 0u64;
    match fs.list(dir) {
        Ok(names) => {
            for name in names {
                let (stem, _is_clean) = split_suffix(&name);
                let id = match parse_chunk_id(stem) {
                    Ok(id) => id,
                    Err(e) => {
                        error!(error = %e, "illegal filename during format walk");
                        ready.signal_failed();
                        return;
                    }
                };
                if id == 0 || id > target {
                    continue;
                }
                if present[id as usize].swap(true, Ordering::SeqCst) {
                    error!(id, "duplicate id found during format walk");
                    ready.signal_failed();
                    return;
                }
                pre_existing[id as usize] = true;
                existing += 1;
            }
        }
        Err(e) => {
            error!(error = %e, "list pool dir failed during format walk");
            ready.signal_failed();
            return;
        }
    }

    let allocated = AtomicU64::new(existing.max(1));
    let failure = AtomicBool::new(false);
    let max_index = AtomicU64::new(1);

    thread::scope(|scope| {
        for _ in 0..worker_threads.max(1) {
            scope.spawn(|| worker_loop(fs, dir, chunk_len, bytes_per_write, target, &allocated, &present, &failure));
        }

        loop {
            thread::sleep(DRIVER_TICK);

            loop {
                let idx = max_index.load(Ordering::Acquire);
                if idx > target || !present[idx as usize].load(Ordering::Acquire) {
                    break;
                }
                let name = format!("{idx}{CLEAN_SUFFIX}");
                match check_pool_file(fs, dir, &name, chunk_len) {
                    Ok(_) => {
                        // Ids the Scanner already seeded before the Formatter
                        // ran are tracked in `present` only so the driver can
                        // walk past them contiguously; re-seeding them here
                        // would double-count them against P1/I1.
                        if !pre_existing[idx as usize] {
                            inventory.seed(Kind::Clean, idx);
                        }
                        max_index.store(idx + 1, Ordering::Release);
                    }
                    Err(e) => {
                        error!(error = %e, id = idx, "check pool file failed");
                        failure.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }

            if failure.load(Ordering::Acquire) {
                ready.signal_failed();
                break;
            }

            if max_index.load(Ordering::Acquire) > min_chunk_file_num {
                ready.signal_ready();
            }

            // `allocated` is the claim counter, incremented the instant a
            // worker starts a chunk — it runs ahead of completions. Gate
            // termination on `max_index`, which only advances once a
            // chunk's file has actually been verified and seeded, so the
            // driver keeps draining until every claimed id up to `target`
            // is accounted for in the inventory.
            if max_index.load(Ordering::Acquire) > target {
                ready.signal_ready();
                break;
            }
        }
    });

    inventory.set_next_id_floor(target);
    info!(allocated = allocated.load(Ordering::Acquire), "format worker done");
}

fn worker_loop(
    fs: &dyn FileSystem,
    dir: &Path,
    chunk_len: u64,
    bytes_per_write: u32,
    target: u64,
    allocated: &AtomicU64,
    present: &[AtomicBool],
    failure: &AtomicBool,
) {
    while !failure.load(Ordering::Acquire) {
        let id = allocated.fetch_add(1, Ordering::AcqRel);
        if id > target {
            allocated.fetch_sub(1, Ordering::AcqRel);
            break;
        }

        let path = dir.join(format!("{id}{CLEAN_SUFFIX}"));
        if let Err(e) = allocate_chunk(fs, &path, chunk_len, bytes_per_write) {
            error!(error = %e, id, "format allocation failed");
            failure.store(true, Ordering::SeqCst);
            break;
        }
        present[id as usize].store(true, Ordering::Release);
    }
}

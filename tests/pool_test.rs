// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! End-to-end pool lifecycle tests: bootstrap, hot-path get/recycle,
//! cleaner convergence, and crash-recovery rescan.
//!
//! Run with: `cargo test`

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use filepool::config::PoolOptions;
use filepool::error::PoolError;
use filepool::fs::UnixFileSystem;
use filepool::pool::Pool;

fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn options(dir: &TempDir, pre_allocate_num: u64) -> PoolOptions {
    PoolOptions {
        get_file_from_pool: true,
        file_pool_dir: dir.path().join("pool"),
        meta_path: dir.path().join("pool.meta"),
        meta_file_size: 4096,
        file_size: 1024,
        meta_page_size: 64,
        block_size: 4096,
        allocate_by_percent: false,
        allocate_percent: 0,
        pre_allocate_num,
        bytes_per_write: 256,
        retry_times: 3,
        need_clean: true,
        iops4clean: 0, // unthrottled, for fast tests
        min_chunk_file_num: 1,
        format_worker_threads: 2,
    }
}

fn new_pool(opts: PoolOptions) -> Pool {
    Pool::new(Arc::new(UnixFileSystem), opts)
}

#[test]
fn bootstrap_creates_descriptor_and_reaches_min_population() {
    let dir = tmp_dir();
    let mut pool = new_pool(options(&dir, 4));
    pool.initialize().expect("initialize");

    assert!(dir.path().join("pool.meta").is_file());
    let state = pool.get_state();
    assert!(state.preallocated_left >= 1);
    assert_eq!(state.chunk_size, 1024);
}

#[test]
fn get_file_claims_a_clean_chunk_and_writes_meta_page() {
    let dir = tmp_dir();
    let mut pool = new_pool(options(&dir, 4));
    pool.initialize().expect("initialize");

    // Give the background formatter a moment to finish preallocating.
    wait_until(|| pool.size() >= 4, Duration::from_secs(5));

    let dest = dir.path().join("claimed-chunk");
    let meta_page = vec![0x5Au8; 64];
    pool.get_file(&dest, &meta_page, false).expect("get_file");

    let bytes = std::fs::read(&dest).expect("read claimed chunk");
    assert_eq!(bytes.len(), 1024 + 64);
    assert_eq!(&bytes[..64], meta_page.as_slice());
}

#[test]
fn recycle_then_clean_converges_dirty_to_clean() {
    let dir = tmp_dir();
    let mut pool = new_pool(options(&dir, 2));
    pool.initialize().expect("initialize");
    wait_until(|| pool.size() >= 2, Duration::from_secs(5));

    let dest = dir.path().join("in-use-chunk");
    pool.get_file(&dest, &[], false).expect("get_file");
    pool.recycle_file(&dest).expect("recycle_file");

    assert!(pool.get_state().dirty_left >= 1);

    pool.start_cleaning();
    wait_until(|| pool.get_state().dirty_left == 0, Duration::from_secs(5));
    pool.stop_cleaning();

    assert!(pool.get_state().clean_left >= 1);
}

#[test]
fn get_file_on_a_pool_with_no_target_population_returns_pool_empty() {
    let dir = tmp_dir();
    let opts = options(&dir, 0);
    let mut pool = new_pool(opts);
    pool.initialize().expect("initialize");
    assert_eq!(pool.size(), 0);

    let dest = dir.path().join("wont-exist");
    let err = pool.get_file(&dest, &[], false).unwrap_err();
    assert!(matches!(err, PoolError::PoolEmpty));
}

#[test]
fn rescans_existing_directory_on_restart() {
    let dir = tmp_dir();
    {
        let mut pool = new_pool(options(&dir, 3));
        pool.initialize().expect("initialize");
        wait_until(|| pool.size() >= 3, Duration::from_secs(5));
        pool.uninitialize();
    }

    let mut pool = new_pool(options(&dir, 3));
    pool.initialize().expect("re-initialize after restart");
    assert!(pool.size() >= 3);
}

#[test]
fn non_pool_mode_allocates_fresh_files_directly() {
    let dir = tmp_dir();
    let mut opts = options(&dir, 0);
    opts.get_file_from_pool = false;
    let mut pool = new_pool(opts);
    pool.initialize().expect("initialize");

    let dest = dir.path().join("direct-chunk");
    pool.get_file(&dest, &[0xAB; 64], false).expect("get_file");
    let bytes = std::fs::read(&dest).expect("read");
    assert_eq!(bytes.len(), 1024 + 64);
    assert_eq!(&bytes[..64], &[0xAB; 64][..]);
}

#[test]
fn get_file_rename_collision_is_reported_without_requeue() {
    let dir = tmp_dir();
    let mut pool = new_pool(options(&dir, 2));
    pool.initialize().expect("initialize");
    wait_until(|| pool.size() >= 2, Duration::from_secs(5));

    let dest = dir.path().join("collides");
    std::fs::write(&dest, b"already here").unwrap();

    let before = pool.size();
    let err = pool.get_file(&dest, &[], false).unwrap_err();
    assert!(matches!(err, PoolError::AlreadyExists(_)));
    // The claimed id is dropped, not requeued: population strictly shrinks.
    assert_eq!(pool.size(), before - 1);
}

#[test]
fn descriptor_crc_mismatch_rejects_initialize_without_mutating_the_directory() {
    let dir = tmp_dir();
    let opts = options(&dir, 2);

    // Seed a descriptor with one flipped byte, bypassing `Pool::initialize`.
    std::fs::create_dir_all(&opts.file_pool_dir).unwrap();
    let meta = filepool::descriptor::PoolDescriptor {
        chunk_size: opts.file_size,
        meta_page_size: opts.meta_page_size,
        block_size: Some(opts.block_size),
        file_pool_path: opts.file_pool_dir.clone(),
    };
    let mut bytes = meta.encode();
    bytes[10] ^= 0xFF;
    std::fs::write(&opts.meta_path, &bytes).unwrap();

    let mut pool = new_pool(opts);
    let err = pool.initialize().unwrap_err();
    assert!(matches!(err, PoolError::DescriptorInvalid(_)));

    // No chunk files were created as a side effect of the rejected startup.
    assert_eq!(std::fs::read_dir(dir.path().join("pool")).unwrap().count(), 0);
}

#[test]
fn malformed_filename_in_pool_dir_fails_initialize() {
    let dir = tmp_dir();
    let opts = options(&dir, 2);
    std::fs::create_dir_all(&opts.file_pool_dir).unwrap();
    std::fs::write(opts.file_pool_dir.join("abc"), b"not a chunk").unwrap();

    let mut pool = new_pool(opts);
    let err = pool.initialize().unwrap_err();
    assert!(matches!(err, PoolError::DirIllegalContent(_)));
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) {
    let start = Instant::now();
    while !cond() {
        if start.elapsed() > timeout {
            panic!("condition not met within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

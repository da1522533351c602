// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! filepool — local preallocation/recycling pool for chunk-server storage
//!
//! Usage:
//!   filepool format --config pool.toml
//!   filepool status --config pool.toml
//!   filepool get    --config pool.toml --dest /data/chunks/42 --meta-page-size 4096
//!   filepool recycle --config pool.toml --path /data/chunks/42
//!   filepool clean  --config pool.toml --seconds 30

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use filepool::config::PoolOptions;
use filepool::fs::UnixFileSystem;
use filepool::pool::Pool;

#[derive(Parser)]
#[command(name = "filepool", about = "Chunk-server file pool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the pool: validate/create the descriptor and grow to the
    /// configured population.
    Format {
        #[arg(short, long, default_value = "pool.toml")]
        config: PathBuf,
    },
    /// Print a snapshot of pool geometry and population.
    Status {
        #[arg(short, long, default_value = "pool.toml")]
        config: PathBuf,
    },
    /// Pull one ready-to-use file out of the pool.
    Get {
        #[arg(short, long, default_value = "pool.toml")]
        config: PathBuf,
        /// Where the claimed file should end up.
        #[arg(long)]
        dest: PathBuf,
        /// Whether a dirty file popped for this request must be
        /// synchronously zeroed before use.
        #[arg(long, default_value_t = false)]
        need_clean: bool,
    },
    /// Return a file to the pool for recycling.
    Recycle {
        #[arg(short, long, default_value = "pool.toml")]
        config: PathBuf,
        #[arg(long)]
        path: PathBuf,
    },
    /// Run the background cleaner for a fixed duration, then stop.
    Clean {
        #[arg(short, long, default_value = "pool.toml")]
        config: PathBuf,
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Format { config } => run_format(config),
        Command::Status { config } => run_status(config),
        Command::Get { config, dest, need_clean } => run_get(config, dest, need_clean),
        Command::Recycle { config, path } => run_recycle(config, path),
        Command::Clean { config, seconds } => run_clean(config, seconds),
    }
}

fn load_pool(config_path: &PathBuf) -> Pool {
    let options = match PoolOptions::from_file(config_path) {
        Ok(o) => o,
        Err(e) => {
            error!(error = %e, "failed to load pool config");
            std::process::exit(1);
        }
    };
    Pool::new(Arc::new(UnixFileSystem), options)
}

fn run_format(config: PathBuf) {
    let mut pool = load_pool(&config);
    info!("initializing pool");
    if let Err(e) = pool.initialize() {
        error!(error = %e, "initialize failed");
        std::process::exit(1);
    }
    let state = pool.get_state();
    info!(
        preallocated = state.preallocated_left,
        dirty = state.dirty_left,
        clean = state.clean_left,
        "pool ready"
    );
}

fn run_status(config: PathBuf) {
    let mut pool = load_pool(&config);
    if let Err(e) = pool.initialize() {
        error!(error = %e, "initialize failed");
        std::process::exit(1);
    }
    let state = pool.get_state();
    println!(
        "chunk_size={} meta_page_size={} block_size={} dirty={} clean={} total={}",
        state.chunk_size, state.meta_page_size, state.block_size, state.dirty_left, state.clean_left, state.preallocated_left
    );
}

fn run_get(config: PathBuf, dest: PathBuf, need_clean: bool) {
    let mut pool = load_pool(&config);
    if let Err(e) = pool.initialize() {
        error!(error = %e, "initialize failed");
        std::process::exit(1);
    }
    match pool.get_file(&dest, &[], need_clean) {
        Ok(()) => info!(dest = %dest.display(), "file claimed from pool"),
        Err(e) => {
            error!(error = %e, "get_file failed");
            std::process::exit(1);
        }
    }
}

fn run_recycle(config: PathBuf, path: PathBuf) {
    let mut pool = load_pool(&config);
    if let Err(e) = pool.initialize() {
        error!(error = %e, "initialize failed");
        std::process::exit(1);
    }
    match pool.recycle_file(&path) {
        Ok(()) => info!(path = %path.display(), "file recycled"),
        Err(e) => {
            error!(error = %e, "recycle_file failed");
            std::process::exit(1);
        }
    }
}

fn run_clean(config: PathBuf, seconds: u64) {
    let mut pool = load_pool(&config);
    if let Err(e) = pool.initialize() {
        error!(error = %e, "initialize failed");
        std::process::exit(1);
    }
    pool.start_cleaning();
    info!(seconds, "cleaner running");
    std::thread::sleep(Duration::from_secs(seconds));
    pool.stop_cleaning();
    let state = pool.get_state();
    info!(dirty = state.dirty_left, clean = state.clean_left, "cleaner stopped");
}

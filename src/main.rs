//! pagepool workload driver - runs a randomized page workload against a
//! sharded buffer pool.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use pagepool::{DiskManager, LogManager, PageId, ParallelBufferPoolManager, PoolError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;

/// Randomized smoke workload for the sharded buffer pool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data file (truncated if it exists)
    #[arg(short, long, default_value = "./pagepool.db")]
    file: PathBuf,

    /// Write-ahead log file
    #[arg(short, long, default_value = "./pagepool.wal")]
    wal: PathBuf,

    /// Number of buffer pool instances
    #[arg(short, long, default_value = "4")]
    instances: u32,

    /// Frames per instance
    #[arg(short = 'n', long, default_value = "64")]
    frames: usize,

    /// Number of random page operations
    #[arg(short, long, default_value = "10000")]
    ops: usize,

    /// RNG seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let disk_manager =
        Arc::new(DiskManager::create(&args.file).context("Failed to create data file")?);
    let log_manager = Arc::new(LogManager::create(&args.wal).context("Failed to create WAL file")?);
    let pool = ParallelBufferPoolManager::new(
        args.instances,
        args.frames,
        disk_manager,
        Some(log_manager.clone()),
    );

    // Seed the id-space with one pool's worth of pages, each stamped with
    // its own id.
    let mut pages: Vec<PageId> = Vec::new();
    for _ in 0..pool.pool_size() {
        let (page_id, mut page) = pool.new_page()?;
        page[..8].copy_from_slice(&(page_id.0 as u64).to_le_bytes());
        pages.push(page_id);
    }
    log::info!(
        "seeded {} pages across {} instances",
        pages.len(),
        args.instances
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut reads = 0usize;
    let mut writes = 0usize;
    let mut allocations = 0usize;

    for _ in 0..args.ops {
        match rng.gen_range(0..10) {
            // Occasionally grow the id-space
            0 => match pool.new_page() {
                Ok((page_id, mut page)) => {
                    page[..8].copy_from_slice(&(page_id.0 as u64).to_le_bytes());
                    pages.push(page_id);
                    allocations += 1;
                }
                Err(PoolError::PoolExhausted) => {}
                Err(err) => return Err(err.into()),
            },
            // Bump a per-page counter
            1..=3 => {
                let page_id = pages[rng.gen_range(0..pages.len())];
                log_manager.append(&page_id.0.to_le_bytes());
                let mut page = pool.fetch_page_write(page_id)?;
                let counter = u64::from_le_bytes(page[8..16].try_into()?);
                page[8..16].copy_from_slice(&(counter + 1).to_le_bytes());
                writes += 1;
            }
            // Verify a page's stamp
            _ => {
                let page_id = pages[rng.gen_range(0..pages.len())];
                let page = pool.fetch_page(page_id)?;
                let stamp = u64::from_le_bytes(page[..8].try_into()?);
                ensure!(
                    stamp == page_id.0 as u64,
                    "page {} holds stamp {}",
                    page_id,
                    stamp
                );
                reads += 1;
            }
        }
    }

    pool.flush_all_pages()?;
    log_manager.flush()?;

    log::info!(
        "completed {} ops over {} pages ({} reads, {} writes, {} allocations)",
        args.ops,
        pages.len(),
        reads,
        writes,
        allocations
    );
    println!(
        "ok: {} operations, {} pages, {} frames, flushed lsn {}",
        args.ops,
        pages.len(),
        pool.pool_size(),
        log_manager.flushed_lsn()
    );

    Ok(())
}

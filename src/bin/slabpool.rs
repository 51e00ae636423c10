//! slabpool command-line tool
//!
//! Inspect the size-class table a configuration produces and exercise the
//! process-wide pool with a multi-threaded allocate/free workload.
//!
//! # Examples
//!
//! ```bash
//! # Print the size classes for a growth factor of 1.25
//! slabpool classes --growth-factor 1.25
//!
//! # Run 8 threads of random allocations and print statistics as JSON
//! slabpool --config pool.toml stress --threads 8 --ops 200000 --json
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use slabpool::{PoolConfig, PoolStats, SlabPool, MAX_OBJECT_SIZE};
use std::path::PathBuf;
use std::ptr::NonNull;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// slabpool - size-classed slab memory pool
#[derive(Parser, Debug)]
#[command(name = "slabpool")]
#[command(version = slabpool::VERSION)]
#[command(about = "Inspect and exercise the slab memory pool", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Pool configuration file (TOML)
    #[arg(long, global = true, env = "SLABPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the size-class table
    Classes {
        /// Override the configured growth factor
        #[arg(long)]
        growth_factor: Option<f64>,
    },

    /// Run random allocate/free traffic against the global pool
    Stress(StressArgs),
}

#[derive(Args, Debug)]
struct StressArgs {
    /// Worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Operations per thread
    #[arg(long, default_value = "100000")]
    ops: usize,

    /// Largest request size in bytes
    #[arg(long, default_value = "4096")]
    max_size: usize,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli);

    let config = PoolConfig::load(cli.config.as_deref()).context("loading pool configuration")?;

    match cli.command {
        Commands::Classes { growth_factor } => {
            let config = match growth_factor {
                Some(factor) => config.with_growth_factor(factor),
                None => config,
            };
            classes_command(&config)
        }
        Commands::Stress(args) => stress_command(&config, args),
    }
}

/// Setup logging to stderr
fn setup_logging(cli: &Cli) {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();
}

/// Classes command - build a lazy pool and print its table
fn classes_command(config: &PoolConfig) -> anyhow::Result<()> {
    let config = config.clone().with_preallocate(false).with_prealloc_pages(false);
    let pool = SlabPool::new(&config)?;
    let stats = pool.stats();

    println!("{:>5} {:>10} {:>10} {:>12}", "id", "chunk", "per page", "page bytes");
    for class in &stats.classes {
        println!(
            "{:>5} {:>10} {:>10} {:>12}",
            class.id.get(),
            class.chunk_size,
            class.chunks_per_page,
            class.page_size()
        );
    }
    println!("{} size classes, growth factor {}", stats.classes.len(), config.growth_factor);
    Ok(())
}

/// Stress command - random traffic on every thread, then report
fn stress_command(config: &PoolConfig, args: StressArgs) -> anyhow::Result<()> {
    if args.max_size == 0 || args.max_size > MAX_OBJECT_SIZE {
        anyhow::bail!("--max-size must be between 1 and {}", MAX_OBJECT_SIZE);
    }

    slabpool::initialize(config)?;
    let pool = slabpool::global();
    info!(threads = args.threads, ops = args.ops, "Starting stress run");

    let start = Instant::now();
    let outcomes: Vec<std::thread::Result<usize>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..args.threads)
            .map(|_| scope.spawn(|| stress_worker(pool, args.ops, args.max_size)))
            .collect();
        workers.into_iter().map(|worker| worker.join()).collect()
    });

    let failures = total_failures(outcomes)?;
    let elapsed = start.elapsed();

    if failures > 0 {
        warn!(failures, "Some allocations failed");
    }
    info!(?elapsed, "Stress run finished");

    let stats = pool.stats();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

/// Sum the failed allocations of every worker; any panicked worker is an error
fn total_failures(outcomes: Vec<std::thread::Result<usize>>) -> anyhow::Result<usize> {
    let workers = outcomes.len();
    let panicked = outcomes.iter().filter(|outcome| outcome.is_err()).count();
    if panicked > 0 {
        error!(panicked, "Stress workers panicked");
        anyhow::bail!("{} of {} stress workers panicked", panicked, workers);
    }
    Ok(outcomes.into_iter().flatten().sum())
}

/// One thread of random allocate/free; returns the number of failed allocations
fn stress_worker(pool: &SlabPool, ops: usize, max_size: usize) -> usize {
    let mut rng = rand::thread_rng();
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
    let mut failures = 0;

    for _ in 0..ops {
        if !live.is_empty() && rng.gen_bool(0.5) {
            let (ptr, size) = live.swap_remove(rng.gen_range(0..live.len()));
            unsafe { pool.free(ptr, size) };
            continue;
        }

        let size = rng.gen_range(1..=max_size);
        match pool.allocate(size) {
            Some(ptr) => {
                unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xA5, size) };
                live.push((ptr, size));
            }
            None => failures += 1,
        }
    }

    for (ptr, size) in live {
        unsafe { pool.free(ptr, size) };
    }
    failures
}

fn print_stats(stats: &PoolStats) {
    match &stats.arena {
        Some(arena) => println!(
            "Arena: {} / {} bytes used, {} remaining",
            arena.used,
            arena.capacity,
            arena.remaining()
        ),
        None => println!("Arena: none ({} bytes of heap pages)", stats.heap_page_bytes),
    }
    println!("Pages: {}", stats.total_pages);
    println!("Live chunks: {}", stats.live_chunks());

    println!(
        "{:>5} {:>10} {:>6} {:>12} {:>10} {:>10}",
        "id", "chunk", "pages", "bytes", "carved", "free"
    );
    for class in stats.classes.iter().filter(|c| c.pages > 0) {
        println!(
            "{:>5} {:>10} {:>6} {:>12} {:>10} {:>10}",
            class.id.get(),
            class.chunk_size,
            class.pages,
            class.page_bytes(),
            class.carved_chunks,
            class.free_chunks
        );
    }
}

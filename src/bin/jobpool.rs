use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::exit;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use serde::Serialize;

use jobpool::probe::{probe, resolve, ProbeResult, Resolution};
use jobpool::{Pool, PoolConfig, PoolError, RayonThreadPool, Result, ThreadPool};

#[derive(Parser)]
#[command(
    name = "jobpool",
    version,
    about = "Runs targets read from stdin through a bounded worker pool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Number of concurrent workers [default: number of CPUs]
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Delay between starting two workers
    #[arg(long, value_name = "MS", global = true)]
    interval_ms: Option<u64>,

    /// JSON file with pool settings; flags take precedence
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Where the workers run
    #[arg(long, value_enum, default_value_t = Executor::Threads, global = true)]
    executor: Executor,

    /// Print one JSON object per result
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which host:port targets accept TCP connections
    Probe {
        /// Connect timeout per address
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        timeout_ms: u64,
    },
    /// Resolve host names to IP addresses
    Resolve,
}

#[derive(Clone, Copy, ValueEnum)]
enum Executor {
    /// One dedicated thread per worker
    Threads,
    /// A rayon thread pool
    Rayon,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => PoolConfig::load(path)?,
        None => PoolConfig::default(),
    };
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    if let Some(ms) = cli.interval_ms {
        config.interval_ms = ms;
    }

    match cli.command {
        Commands::Probe { timeout_ms } => {
            let timeout = Duration::from_millis(timeout_ms);
            scan(
                &config,
                cli.executor,
                cli.json,
                move |target: String| probe(&target, timeout),
                |r: &ProbeResult| format!("{} open ({})", r.target, r.addr),
            )
        }
        Commands::Resolve => scan(
            &config,
            cli.executor,
            cli.json,
            |host: String| resolve(&host),
            |r: &Resolution| {
                let addrs: Vec<String> = r.addrs.iter().map(|a| a.to_string()).collect();
                format!("{} {}", r.host, addrs.join(","))
            },
        ),
    }
}

/// Feeds stdin into a pool running `f` and prints results as they arrive.
fn scan<O, F, D>(
    config: &PoolConfig,
    executor: Executor,
    json: bool,
    f: F,
    display: D,
) -> Result<()>
where
    O: Serialize + Send + 'static,
    F: Fn(String) -> Option<O> + Send + Sync + 'static,
    D: Fn(&O) -> String,
{
    let threads =
        u32::try_from(config.threads).map_err(|_| PoolError::InvalidThreads(config.threads))?;
    let pool = Pool::from_config(config)?;
    pool.set_function(f);
    info!(
        "jobpool {}: {} workers",
        env!("CARGO_PKG_VERSION"),
        pool.threads()
    );

    let producer = {
        let pool = pool.clone();
        thread::spawn(move || {
            let res = feed(&pool, io::stdin().lock());
            pool.in_done();
            res
        })
    };
    let runner = {
        let pool = pool.clone();
        thread::spawn(move || {
            let res = match executor {
                Executor::Threads => pool.run(),
                Executor::Rayon => {
                    RayonThreadPool::new(threads).and_then(|executor| pool.run_on(&executor))
                }
            };
            // Unblocks the output loop below if no worker was ever started.
            if res.is_err() {
                pool.out_done();
            }
            res
        })
    };

    let mut out = io::stdout().lock();
    for result in pool.output() {
        if json {
            serde_json::to_writer(&mut out, &result)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", display(&result))?;
        }
    }
    out.flush()?;

    runner.join().map_err(|_| panicked("pool runner"))??;
    producer.join().map_err(|_| panicked("input reader"))??;
    Ok(())
}

/// Sends every non-blank, non-comment line to the pool.
fn feed<O: Send + 'static>(pool: &Pool<String, O>, input: impl BufRead) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let target = line.trim();
        if target.is_empty() || target.starts_with('#') {
            continue;
        }
        pool.send(target.to_owned())?;
    }
    Ok(())
}

fn panicked(what: &str) -> PoolError {
    PoolError::StringError(format!("{} thread panicked", what))
}

//! # Handoff Benchmark Binary
//!
//! Measures per-message latency and bandwidth of the flag-gated shared memory
//! handoff between a receiver (parent) and a sender (child) process.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 100000 iterations, sizes 0..=256 KiB
//! handoff_bench
//!
//! # Short run pinned to two cores, JSON report lines
//! handoff_bench -n 1000 -m 65536 --sender-cpu 2 --receiver-cpu 3 --json
//!
//! # Settings from a file, bounded waits, debug logs
//! handoff_bench --config handoff.toml --timeout-ms 5000 -v
//! ```

#![deny(warnings)]

use clap::Parser;
use handoff_bench::run_forked;
use handoff_common::config::{BenchConfig, ConfigLoader, OutputFormat};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shared memory handoff benchmark
#[derive(Parser, Debug)]
#[command(name = "handoff_bench")]
#[command(version)]
#[command(about = "Latency and bandwidth of a flag-gated shared memory handoff")]
#[command(long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Handoffs per message size
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Largest message size in bytes
    #[arg(short, long = "max-size", value_name = "BYTES")]
    max_size: Option<usize>,

    /// Maximum spins per wait (unbounded if absent)
    #[arg(long, value_name = "N")]
    spin_limit: Option<u64>,

    /// Maximum wall time per wait in milliseconds (unbounded if absent)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Pin the sender process to this core
    #[arg(long, value_name = "CPU")]
    sender_cpu: Option<usize>,

    /// Pin the receiver process to this core
    #[arg(long, value_name = "CPU")]
    receiver_cpu: Option<usize>,

    /// Emit report lines as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// CLI values win over file values
    fn apply(&self, config: &mut BenchConfig) {
        let bench = &mut config.bench;
        if let Some(iterations) = self.iterations {
            bench.iterations = iterations;
        }
        if let Some(max_size) = self.max_size {
            bench.max_message_size = max_size;
        }
        if self.spin_limit.is_some() {
            bench.spin_limit = self.spin_limit;
        }
        if self.timeout_ms.is_some() {
            bench.timeout_ms = self.timeout_ms;
        }
        if self.sender_cpu.is_some() {
            bench.sender_cpu = self.sender_cpu;
        }
        if self.receiver_cpu.is_some() {
            bench.receiver_cpu = self.receiver_cpu;
        }
        if self.json {
            bench.output = OutputFormat::Json;
        }
    }

    /// File settings (or defaults) with CLI overrides applied
    fn load_config(&self) -> Result<BenchConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load(path)?,
            None => BenchConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("handoff benchmark failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = args.load_config()?;

    setup_tracing(&args, &config)?;
    config.validate()?;

    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let mut stdout = std::io::stdout();
    run_forked(&config.bench, &mut stdout)?;
    Ok(())
}

/// Setup tracing subscriber from CLI arguments and the configured level.
///
/// Logs go to stderr so stdout carries only report lines.
fn setup_tracing(args: &Args, config: &BenchConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = if args.verbose {
        "debug"
    } else {
        config.shared.log_level.as_directive()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.parse()?);

    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

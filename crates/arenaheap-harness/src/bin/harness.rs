//! CLI entrypoint for the arenaheap harness.

use std::io::Write;
use std::path::PathBuf;

use arenaheap_core::malloc::DEFAULT_LOG_CAPACITY;
use arenaheap_harness::{LogEmitter, ReplayOptions, StormConfig, Trace, replay, run_storm};
use clap::{Parser, Subcommand};

/// Replay and stress tooling for arenaheap.
#[derive(Debug, Parser)]
#[command(name = "arenaheap-harness")]
#[command(about = "Trace replay and allocation storms for arenaheap")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a JSON allocation trace, then print statistics and leaks.
    Replay {
        /// Trace JSON path.
        #[arg(long)]
        trace: PathBuf,
        /// Write lifecycle records as JSONL to this path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Report invalid frees and keep going instead of stopping.
        #[arg(long)]
        hardened: bool,
        /// Arena size when the trace does not name one.
        #[arg(long, default_value_t = 1 << 20)]
        arena_size: usize,
    },
    /// Run a seeded random allocation storm with invariant checks.
    Storm {
        #[arg(long, default_value_t = StormConfig::default().seed)]
        seed: u64,
        #[arg(long, default_value_t = StormConfig::default().steps)]
        steps: usize,
        #[arg(long, default_value_t = StormConfig::default().arena_size)]
        arena_size: usize,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            trace,
            log,
            hardened,
            arena_size,
        } => {
            let parsed = Trace::from_file(&trace)?;
            let options = ReplayOptions {
                default_arena_size: arena_size,
                // Every op logs at most a split, a coalesce and its own record.
                log_capacity: if log.is_some() {
                    DEFAULT_LOG_CAPACITY.max(parsed.ops.len().saturating_mul(3))
                } else {
                    0
                },
                stop_on_invalid_free: !hardened,
            };
            let mut outcome = replay(&parsed, &options)?;

            if let Some(path) = log {
                let mut emitter = LogEmitter::to_file(&path)?;
                emitter.emit_all(&outcome.heap.drain_lifecycle_logs())?;
                emitter.flush()?;
                eprintln!("Wrote {} lifecycle records to {}", emitter.lines(), path.display());
            }

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            outcome.heap.write_statistics(&mut out)?;
            outcome.heap.write_leak_report(&mut out)?;
            out.flush()?;

            for (_, err) in &outcome.invalid_frees {
                eprintln!("MEMORY BUG: {err}");
            }
            if outcome.stopped_at.is_some() {
                std::process::exit(1);
            }
        }
        Command::Storm {
            seed,
            steps,
            arena_size,
            json,
        } => {
            let config = StormConfig {
                seed,
                steps,
                arena_size,
                ..StormConfig::default()
            };
            let report = run_storm(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "storm seed={} steps={} allocations={} failures={} frees={} rejected_frees={} peak_extents={}",
                    report.seed,
                    report.steps,
                    report.allocations,
                    report.failures,
                    report.frees,
                    report.rejected_frees,
                    report.peak_extents
                );
            }
        }
    }

    Ok(())
}

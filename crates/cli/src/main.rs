//! Memory-hierarchy simulator CLI.
//!
//! Runs one binary instruction trace per CPU through the cache and
//! DRAM hierarchy, printing a heartbeat every `--heartbeat`
//! instructions and a final multi-section statistics report.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use memsim_core::config::Config;
use memsim_core::Simulator;

#[derive(Parser, Debug)]
#[command(
    name = "memsim",
    author,
    version,
    about = "Cycle-accurate, trace-driven memory-hierarchy simulator",
    long_about = "Simulates a multi-level cache hierarchy and DRAM controller driven by one \
binary instruction trace per CPU, with a hashed-perceptron off-chip load \
predictor.\n\nExamples:\n  memsim trace0.bin.gz\n  memsim --config config.json trace0.bin.xz trace1.bin.xz"
)]
struct Cli {
    /// One trace file per simulated CPU (plain, .gz, or .xz).
    #[arg(required = true)]
    traces: Vec<PathBuf>,

    /// JSON configuration file overriding built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instructions to execute per CPU before measurement begins.
    #[arg(long)]
    warmup_instructions: Option<u64>,

    /// Instructions to execute per CPU once measurement begins.
    #[arg(long)]
    simulation_instructions: Option<u64>,

    /// Instructions between heartbeat log lines.
    #[arg(long)]
    heartbeat_instructions: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => load_config(&path),
        None => Config::default(),
    };

    if let Some(warmup) = cli.warmup_instructions {
        config.sim.warmup_instructions = warmup;
    }
    if let Some(sim_instructions) = cli.simulation_instructions {
        config.sim.simulation_instructions = sim_instructions;
    }
    if let Some(heartbeat) = cli.heartbeat_instructions {
        config.sim.heartbeat_instructions = heartbeat;
    }

    let warmup = config.sim.warmup_instructions;
    let run_length = config.sim.simulation_instructions;

    let mut simulator = match Simulator::new(config, &cli.traces) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    match simulator.run(warmup, run_length) {
        Ok(stats) => {
            stats.print_sections();
            process::exit(0);
        }
        Err(e) => {
            eprintln!("fatal: {e}");
            process::exit(1);
        }
    }
}

fn load_config(path: &PathBuf) -> Config {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error reading {}: {e}", path.display());
        process::exit(1);
    });
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        eprintln!("error parsing {}: {e}", path.display());
        process::exit(1);
    })
}

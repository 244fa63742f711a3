//! flow-sim - command-line host for the flow simulator engine
//!
//! Reads `{"config": {...}, "graph": {"nodes": [...], "links": [...]}}`,
//! drives a background engine, and prints every engine event to stdout as
//! one JSON line. Logs go to stderr, filtered by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flow_simulator_core::{build_graph, EngineEvent, FlowEngine, GraphDefinition, SimulationConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "flow-sim", author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation and stream its events as JSON lines
    Run {
        /// Input file with `config` and `graph`
        input: PathBuf,

        /// Override the config seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Pause once this many iterations have completed
        #[arg(long)]
        pause_after: Option<u64>,

        /// While paused, step this many iterations before resuming
        #[arg(long, requires = "pause_after")]
        step: Option<u64>,
    },

    /// Validate an input file without running it
    Validate {
        /// Input file with `config` and `graph`
        input: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct SimulationInput {
    #[serde(default)]
    config: SimulationConfig,
    graph: GraphDefinition,
}

/// Where the host is in its pause/step/resume script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    PauseRequested,
    Stepping,
    Resumed,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Commands::Run {
            input,
            seed,
            pause_after,
            step,
        } => {
            let mut input = load_input(&input)?;
            if let Some(seed) = seed {
                input.config.seed = seed;
            }
            run(input, pause_after, step)
        }
        Commands::Validate { input } => validate(&input),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_input(path: &Path) -> Result<SimulationInput> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
    let input = load_input(path)?;
    input.config.validate().context("invalid config")?;
    let graph = build_graph(input.graph.nodes, input.graph.links).context("invalid graph")?;

    println!(
        "ok: {} nodes, {} links, {} source(s)",
        graph.node_count(),
        graph.link_count(),
        graph.sources().len()
    );
    Ok(())
}

fn run(input: SimulationInput, pause_after: Option<u64>, step: Option<u64>) -> Result<()> {
    let engine = FlowEngine::spawn()?;
    info!(iterations = input.config.iterations, seed = input.config.seed, "starting simulation");
    engine.start(input.config, input.graph)?;

    let mut phase = Phase::Running;
    loop {
        let Some(event) = engine.recv_timeout(POLL_INTERVAL)? else {
            continue;
        };
        println!("{}", serde_json::to_string(&event)?);

        match &event {
            EngineEvent::SimulationUpdate { progress, .. } => match phase {
                Phase::Running if pause_after.is_some_and(|n| progress.iterations_completed >= n) => {
                    engine.pause()?;
                    phase = Phase::PauseRequested;
                }
                Phase::Stepping => {
                    engine.resume()?;
                    phase = Phase::Resumed;
                }
                _ => {}
            },
            EngineEvent::SimulationPaused if phase == Phase::PauseRequested => match step {
                Some(steps) => {
                    engine.step(steps)?;
                    phase = Phase::Stepping;
                }
                None => {
                    engine.resume()?;
                    phase = Phase::Resumed;
                }
            },
            EngineEvent::SimulationError { message } => {
                warn!(error = %message, "engine reported an error");
                bail!("simulation failed: {}", message);
            }
            event if event.ends_run() => {
                info!(event = event.tag(), "simulation finished");
                return Ok(());
            }
            _ => {}
        }
    }
}

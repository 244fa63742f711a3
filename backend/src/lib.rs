//! Flow Simulator Core - Rust Engine
//!
//! Monte Carlo optimizer for financial flow graphs. Each iteration samples
//! a perturbed copy of the graph, walks one path chosen by a UCB1 bandit,
//! and folds the path's return into running statistics.
//!
//! # Architecture
//!
//! - **models**: Flow graph, validation, and result snapshots
//! - **rng**: Deterministic random number generation
//! - **scenarios**: Economic scenarios and per-link value sampling
//! - **policy**: UCB1 path selection
//! - **stats**: Running statistics, risk metrics, convergence
//! - **orchestrator**: The iteration loop for one run
//! - **events**: Control protocol messages and engine events
//! - **runtime**: Scheduler state machine and its background worker
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (seeded RNG threaded through every draw)
//! 2. The graph is immutable once a run starts
//! 3. A stopped or failed run never reports a result
//! 4. FFI boundary is minimal and speaks JSON

// Module declarations
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod runtime;
pub mod scenarios;
pub mod stats;

// Re-exports for convenience
pub use events::{ControlMessage, EngineEvent};
pub use models::{
    build_graph, FlowGraph, FlowLink, FlowNode, FlowSnapshot, GraphDefinition, GraphError,
    NodeCategory, PathStep, RiskMetrics, SimulationProgress, SimulationResult, Uncertainty,
};
pub use orchestrator::{ConfigError, Orchestrator, SimulationConfig, SimulationError};
pub use policy::BanditSelector;
pub use rng::RngManager;
pub use runtime::{FlowEngine, ProtocolError, Scheduler, SchedulerState};
pub use scenarios::{RiskTolerance, Scenario, ScenarioSampler};
pub use stats::StatisticsAccumulator;

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn flow_simulator_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::engine::PyFlowEngine>()?;
    Ok(())
}

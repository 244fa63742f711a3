//! Orchestrator - the iteration core of a simulation run
//!
//! See `engine.rs` for the iteration loop and `config.rs` for run
//! configuration.

pub mod config;
pub mod engine;
pub mod fingerprint;

pub use config::{ConfigError, SimulationConfig, MAX_ITERATIONS};
pub use engine::{IterationResult, Orchestrator, SimulationError};
pub use fingerprint::compute_config_hash;

//! Control protocol message types
//!
//! The host and the background engine communicate only through these two
//! enums. Both are plain owned values tagged by `type`, so they cross thread
//! boundaries by move and JSON boundaries unchanged:
//!
//! ```json
//! {"type": "STEP_SIMULATION", "steps": 10}
//! {"type": "SIMULATION_ERROR", "message": "..."}
//! ```
//!
//! # Design Principles
//!
//! 1. **Self-contained**: Messages carry copies, never references to engine state
//! 2. **One terminal event per run**: `SIMULATION_STOPPED`,
//!    `SIMULATION_COMPLETE`, or `SIMULATION_ERROR` from a failed batch
//! 3. **No partial results**: an error event never carries a result

use serde::{Deserialize, Serialize};

use crate::models::graph::GraphDefinition;
use crate::models::result::{FlowSnapshot, SimulationProgress, SimulationResult};
use crate::orchestrator::config::SimulationConfig;

/// Caller → engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Begin a new run (valid when no run is active)
    ///
    /// The graph is validated by the engine, so topology errors surface as
    /// `SIMULATION_ERROR` rather than at the call site.
    StartSimulation {
        config: SimulationConfig,
        #[serde(rename = "initialGraph")]
        initial_graph: GraphDefinition,
    },

    /// Running → Paused at the next batch boundary
    PauseSimulation,

    /// Paused → Running
    ResumeSimulation,

    /// Run exactly `steps` more iterations while paused
    StepSimulation { steps: u64 },

    /// Running or Paused → Stopped
    StopSimulation,
}

impl ControlMessage {
    /// Wire tag, for logging
    pub fn tag(&self) -> &'static str {
        match self {
            ControlMessage::StartSimulation { .. } => "START_SIMULATION",
            ControlMessage::PauseSimulation => "PAUSE_SIMULATION",
            ControlMessage::ResumeSimulation => "RESUME_SIMULATION",
            ControlMessage::StepSimulation { .. } => "STEP_SIMULATION",
            ControlMessage::StopSimulation => "STOP_SIMULATION",
        }
    }
}

/// Engine → caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    SimulationUpdate {
        progress: SimulationProgress,
        #[serde(rename = "flowData")]
        flow_data: FlowSnapshot,
    },

    SimulationPaused,

    SimulationResumed,

    SimulationStopped,

    SimulationComplete {
        #[serde(rename = "flowData")]
        flow_data: FlowSnapshot,
        results: SimulationResult,
    },

    SimulationError { message: String },
}

impl EngineEvent {
    /// Wire tag, for logging
    pub fn tag(&self) -> &'static str {
        match self {
            EngineEvent::SimulationUpdate { .. } => "SIMULATION_UPDATE",
            EngineEvent::SimulationPaused => "SIMULATION_PAUSED",
            EngineEvent::SimulationResumed => "SIMULATION_RESUMED",
            EngineEvent::SimulationStopped => "SIMULATION_STOPPED",
            EngineEvent::SimulationComplete { .. } => "SIMULATION_COMPLETE",
            EngineEvent::SimulationError { .. } => "SIMULATION_ERROR",
        }
    }

    /// Whether this event ends a run
    ///
    /// `SIMULATION_ERROR` is not listed: protocol rejections leave the
    /// current run untouched. The scheduler state tells the two apart.
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            EngineEvent::SimulationStopped | EngineEvent::SimulationComplete { .. }
        )
    }
}

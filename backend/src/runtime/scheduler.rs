//! Simulation scheduler state machine
//!
//! ```text
//! Idle ──START──▶ Running ──PAUSE──▶ Paused
//!                  │  ▲                │ │
//!                  │  └────RESUME──────┘ │ STEP(n): n iterations, stays Paused
//!                  │                     │
//!                  ├── budget spent ──▶ Completed
//!                  ├── STOP (or from Paused) ──▶ Stopped
//!                  └── batch failure ──▶ Errored
//! ```
//!
//! The scheduler is single-threaded and has no notion of time slicing: the
//! worker calls [`Scheduler::run_batch`] while running and checks its control
//! queue between calls, so a batch boundary is the only place a message can
//! take effect. Terminal states accept a fresh `START_SIMULATION`.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::types::{ControlMessage, EngineEvent};
use crate::models::graph::{build_graph, GraphDefinition};
use crate::orchestrator::config::SimulationConfig;
use crate::orchestrator::engine::{Orchestrator, SimulationError};

/// Lifecycle state of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
    Errored,
}

impl SchedulerState {
    /// Whether a run is in flight
    pub fn is_active(self) -> bool {
        matches!(self, SchedulerState::Running | SchedulerState::Paused)
    }
}

/// A control message that is not valid in the current state
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("a simulation is already running; stop it before starting another")]
    AlreadyRunning,

    #[error("{message} (state: {state:?})")]
    InvalidState {
        message: &'static str,
        state: SchedulerState,
    },

    #[error("steps must be greater than zero")]
    InvalidStepCount,

    #[error("engine is no longer running")]
    EngineDisconnected,

    #[error("failed to spawn engine worker: {0}")]
    Spawn(String),
}

struct ActiveRun {
    orchestrator: Orchestrator,
    clock: RunClock,
    next_progress_at: u64,
}

/// Wall time spent executing iterations; paused time is not counted
struct RunClock {
    banked: Duration,
    resumed_at: Option<Instant>,
}

impl RunClock {
    fn running() -> Self {
        Self {
            banked: Duration::ZERO,
            resumed_at: Some(Instant::now()),
        }
    }

    fn pause(&mut self) {
        if let Some(resumed_at) = self.resumed_at.take() {
            self.banked += resumed_at.elapsed();
        }
    }

    fn resume(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn elapsed(&self) -> Duration {
        self.banked + self.resumed_at.map_or(Duration::ZERO, |at| at.elapsed())
    }
}

/// Control state machine for one engine instance
pub struct Scheduler {
    state: SchedulerState,
    run: Option<ActiveRun>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            run: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// Apply one control message and return the events it produced
    pub fn handle(&mut self, message: ControlMessage) -> Vec<EngineEvent> {
        debug!(kind = message.tag(), state = ?self.state, "control message received");

        let outcome = match message {
            ControlMessage::StartSimulation { config, initial_graph } => self.start(config, initial_graph),
            ControlMessage::PauseSimulation => self.pause(),
            ControlMessage::ResumeSimulation => self.resume(),
            ControlMessage::StepSimulation { steps } => self.step(steps),
            ControlMessage::StopSimulation => self.stop(),
        };

        match outcome {
            Ok(events) => events,
            Err(err) => vec![EngineEvent::SimulationError {
                message: err.to_string(),
            }],
        }
    }

    fn start(
        &mut self,
        config: SimulationConfig,
        initial_graph: GraphDefinition,
    ) -> Result<Vec<EngineEvent>, Rejection> {
        if self.state.is_active() {
            warn!(state = ?self.state, "START_SIMULATION rejected: run already active");
            return Err(Rejection::Protocol(ProtocolError::AlreadyRunning));
        }

        let graph = build_graph(initial_graph.nodes, initial_graph.links).map_err(SimulationError::from)?;
        let orchestrator = Orchestrator::new(config, graph)?;

        info!(
            run_id = %orchestrator.run_id(),
            iterations = orchestrator.config().iterations,
            nodes = orchestrator.graph().node_count(),
            links = orchestrator.graph().link_count(),
            "simulation started"
        );

        let next_progress_at = orchestrator.config().progress_interval;
        self.run = Some(ActiveRun {
            orchestrator,
            clock: RunClock::running(),
            next_progress_at,
        });
        self.state = SchedulerState::Running;
        Ok(Vec::new())
    }

    fn pause(&mut self) -> Result<Vec<EngineEvent>, Rejection> {
        self.require(SchedulerState::Running, "PAUSE_SIMULATION requires a running simulation")?;
        self.state = SchedulerState::Paused;
        if let Some(run) = self.run.as_mut() {
            run.clock.pause();
        }
        info!("simulation paused");
        Ok(vec![EngineEvent::SimulationPaused])
    }

    fn resume(&mut self) -> Result<Vec<EngineEvent>, Rejection> {
        self.require(SchedulerState::Paused, "RESUME_SIMULATION requires a paused simulation")?;
        self.state = SchedulerState::Running;
        if let Some(run) = self.run.as_mut() {
            run.clock.resume();
        }
        info!("simulation resumed");
        Ok(vec![EngineEvent::SimulationResumed])
    }

    fn step(&mut self, steps: u64) -> Result<Vec<EngineEvent>, Rejection> {
        self.require(SchedulerState::Paused, "STEP_SIMULATION requires a paused simulation")?;
        if steps == 0 {
            warn!("STEP_SIMULATION rejected: zero steps");
            return Err(Rejection::Protocol(ProtocolError::InvalidStepCount));
        }

        if let Some(run) = self.run.as_mut() {
            run.clock.resume();
        }
        let mut events = Vec::new();
        let executed = self.execute(steps, &mut events);
        if let Some(run) = self.run.as_mut() {
            run.clock.pause();
        }
        if let Some(executed) = executed {
            debug!(executed, "step executed");
            if self.state == SchedulerState::Paused {
                if let Some(update) = self.update_event() {
                    events.push(update);
                }
            }
        }
        Ok(events)
    }

    fn stop(&mut self) -> Result<Vec<EngineEvent>, Rejection> {
        if !self.state.is_active() {
            warn!(state = ?self.state, "STOP_SIMULATION rejected: no active run");
            return Err(Rejection::Protocol(ProtocolError::InvalidState {
                message: "STOP_SIMULATION requires a running or paused simulation",
                state: self.state,
            }));
        }

        if let Some(run) = self.run.take() {
            info!(
                run_id = %run.orchestrator.run_id(),
                iterations = run.orchestrator.iterations_completed(),
                "simulation stopped"
            );
        }
        self.state = SchedulerState::Stopped;
        Ok(vec![EngineEvent::SimulationStopped])
    }

    fn require(&self, expected: SchedulerState, message: &'static str) -> Result<(), Rejection> {
        if self.state == expected {
            Ok(())
        } else {
            warn!(state = ?self.state, "{}", message);
            Err(Rejection::Protocol(ProtocolError::InvalidState {
                message,
                state: self.state,
            }))
        }
    }

    /// Run one batch while `Running`
    ///
    /// Emits `SIMULATION_UPDATE` each time a progress boundary is crossed and
    /// `SIMULATION_COMPLETE` when the budget is spent. Does nothing in any
    /// other state.
    pub fn run_batch(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.is_running() {
            return events;
        }

        let batch_size = match &self.run {
            Some(run) => run.orchestrator.config().batch_size,
            None => return events,
        };

        if self.execute(batch_size, &mut events).is_some() && self.is_running() {
            let crossed = match &mut self.run {
                Some(run) if run.orchestrator.iterations_completed() >= run.next_progress_at => {
                    let interval = run.orchestrator.config().progress_interval;
                    let done = run.orchestrator.iterations_completed();
                    run.next_progress_at = (done / interval + 1) * interval;
                    true
                }
                _ => false,
            };
            if crossed {
                if let Some(update) = self.update_event() {
                    events.push(update);
                }
            }
        }
        events
    }

    /// Run up to `count` iterations, handling completion and failure
    ///
    /// Returns the number executed, or `None` if the batch failed.
    fn execute(&mut self, count: u64, events: &mut Vec<EngineEvent>) -> Option<u64> {
        let run = self.run.as_mut()?;
        let orchestrator = &mut run.orchestrator;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| orchestrator.run_batch(count)));
        let failure = match outcome {
            Ok(Ok(executed)) => {
                debug!(
                    executed,
                    completed = run.orchestrator.iterations_completed(),
                    "batch finished"
                );
                if run.orchestrator.is_complete() {
                    self.complete(events);
                }
                return Some(executed);
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        error!(error = %failure, "simulation batch failed");
        self.run = None;
        self.state = SchedulerState::Errored;
        events.push(EngineEvent::SimulationError {
            message: format!("Simulation failed: {}", failure),
        });
        None
    }

    fn complete(&mut self, events: &mut Vec<EngineEvent>) {
        let Some(run) = self.run.take() else {
            return;
        };
        let results = run.orchestrator.result();
        info!(
            run_id = %results.run_id,
            iterations = results.iterations_completed,
            expected_value = results.expected_value,
            converged = results.convergence_achieved,
            "simulation complete"
        );
        self.state = SchedulerState::Completed;
        events.push(EngineEvent::SimulationComplete {
            flow_data: run.orchestrator.snapshot(),
            results,
        });
    }

    fn update_event(&self) -> Option<EngineEvent> {
        let run = self.run.as_ref()?;
        let progress = run.orchestrator.progress(run.clock.elapsed());
        debug!(
            iterations = progress.iterations_completed,
            mean = progress.mean,
            "progress snapshot"
        );
        Some(EngineEvent::SimulationUpdate {
            progress,
            flow_data: run.orchestrator.snapshot(),
        })
    }
}

/// Anything that can keep a message from taking effect
#[derive(Debug, Error)]
enum Rejection {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with non-string payload".to_string()
    }
}

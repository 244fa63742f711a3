//! Orchestrator Engine
//!
//! Synchronous iteration core of a simulation run. The scheduler in
//! `runtime` owns one `Orchestrator` per run and drives it in batches; the
//! orchestrator itself knows nothing about threads or messages.
//!
//! # Iteration
//!
//! ```text
//! For each iteration i:
//! 1. Choose a scenario (uniform over enabled scenarios)
//! 2. Sample a perturbed value for every link
//! 3. Build a path with the UCB1 selector (≤ time horizon links)
//! 4. Sum signed link contributions into the path return
//! 5. Fold the return into running statistics and credit traversed arms
//! 6. Update per-link running means for snapshots
//! ```
//!
//! # Example
//!
//! ```rust
//! use flow_simulator_core::models::graph::{build_graph, FlowLink, FlowNode, NodeCategory};
//! use flow_simulator_core::orchestrator::{Orchestrator, SimulationConfig};
//!
//! let graph = build_graph(
//!     vec![
//!         FlowNode::new("revenue", "Revenue", NodeCategory::Income, 1000.0),
//!         FlowNode::new("profit", "Profit", NodeCategory::Equity, 400.0),
//!     ],
//!     vec![FlowLink::new(0, 1, 400.0, "retain")],
//! )
//! .unwrap();
//!
//! let config = SimulationConfig { iterations: 50, ..Default::default() };
//! let mut orchestrator = Orchestrator::new(config, graph).unwrap();
//! orchestrator.run_batch(50).unwrap();
//!
//! let result = orchestrator.result();
//! assert_eq!(result.expected_value, 400.0);
//! ```

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::graph::{FlowGraph, GraphError};
use crate::models::result::{FlowSnapshot, PathStep, SimulationProgress, SimulationResult, SnapshotNode};
use crate::orchestrator::config::{ConfigError, SimulationConfig};
use crate::orchestrator::fingerprint::compute_config_hash;
use crate::policy::bandit::{best_path, BanditSelector, SelectedPath};
use crate::rng::RngManager;
use crate::scenarios::{Scenario, ScenarioSampler};
use crate::stats::StatisticsAccumulator;

/// Simulation error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Non-finite path return at iteration {iteration}")]
    NonFiniteReturn { iteration: u64 },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outcome of a single iteration
#[derive(Debug, Clone, PartialEq)]
pub struct IterationResult {
    /// 1-based iteration number
    pub iteration: u64,

    pub scenario: Scenario,

    pub path: SelectedPath,

    /// Sum of signed link contributions along the path
    pub path_return: f64,
}

/// Drives the iterations of one simulation run
#[derive(Debug, Clone)]
pub struct Orchestrator {
    run_id: Uuid,
    config: SimulationConfig,
    graph: FlowGraph,
    config_hash: String,

    rng: RngManager,
    sampler: ScenarioSampler,
    selector: BanditSelector,
    stats: StatisticsAccumulator,

    /// Running sum of sampled values per link
    link_value_sums: Vec<f64>,

    iterations: u64,
}

impl Orchestrator {
    /// Create a new orchestrator for one run
    ///
    /// # Errors
    ///
    /// `SimulationError::InvalidConfig` when the config is out of range.
    pub fn new(config: SimulationConfig, graph: FlowGraph) -> Result<Self, SimulationError> {
        config.validate()?;
        let config_hash = compute_config_hash(&config, &graph)?;

        let rng = RngManager::new(config.seed);
        let sampler = ScenarioSampler::new(config.risk_tolerance, config.time_horizon_months);
        let selector = BanditSelector::new(config.exploration_parameter);
        let stats = StatisticsAccumulator::new(&graph, config.convergence_fraction);
        let link_value_sums = vec![0.0; graph.link_count()];

        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            graph,
            config_hash,
            rng,
            sampler,
            selector,
            stats,
            link_value_sums,
            iterations: 0,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn statistics(&self) -> &StatisticsAccumulator {
        &self.stats
    }

    pub fn iterations_completed(&self) -> u64 {
        self.iterations
    }

    pub fn remaining(&self) -> u64 {
        self.config.iterations - self.iterations
    }

    pub fn is_complete(&self) -> bool {
        self.iterations >= self.config.iterations
    }

    /// Current RNG state (for determinism checks)
    pub fn rng_state(&self) -> u64 {
        self.rng.get_state()
    }

    fn max_steps(&self) -> usize {
        self.config.time_horizon_months as usize
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Execute one iteration
    ///
    /// # Errors
    ///
    /// * `InvariantViolation` if the iteration budget is already spent
    /// * `NonFiniteReturn` if sampling produced a non-finite return
    pub fn run_iteration(&mut self) -> Result<IterationResult, SimulationError> {
        if self.is_complete() {
            return Err(SimulationError::InvariantViolation(format!(
                "iteration budget of {} already spent",
                self.config.iterations
            )));
        }
        let iteration = self.iterations + 1;

        let scenario = self.sampler.choose_scenario(&self.config.scenarios, &mut self.rng);
        let perturbed = self.sampler.sample(&self.graph, scenario, &mut self.rng);
        let path = self
            .selector
            .build_path(&self.graph, self.stats.arms(), self.max_steps());

        let contributions: Vec<f64> = path
            .links
            .iter()
            .map(|&link| self.graph.signed_value(link, perturbed.values[link]))
            .collect();
        if contributions.iter().any(|value| !value.is_finite()) {
            return Err(SimulationError::NonFiniteReturn { iteration });
        }

        let path_return = self.stats.update(&self.graph, &path, &contributions)?;
        if !path_return.is_finite() {
            return Err(SimulationError::NonFiniteReturn { iteration });
        }

        for (sum, value) in self.link_value_sums.iter_mut().zip(&perturbed.values) {
            *sum += value;
        }
        self.iterations = iteration;

        Ok(IterationResult {
            iteration,
            scenario,
            path,
            path_return,
        })
    }

    /// Execute up to `count` iterations, stopping early at the budget
    ///
    /// Returns the number of iterations actually executed.
    pub fn run_batch(&mut self, count: u64) -> Result<u64, SimulationError> {
        let count = count.min(self.remaining());
        for _ in 0..count {
            self.run_iteration()?;
        }
        Ok(count)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Progress report for the caller
    pub fn progress(&self, elapsed: Duration) -> SimulationProgress {
        let elapsed_ms = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
        let estimated_remaining_ms = if self.iterations == 0 {
            0
        } else {
            let per_iteration = elapsed_ms as f64 / self.iterations as f64;
            (per_iteration * self.remaining() as f64).round() as u64
        };

        SimulationProgress {
            run_id: self.run_id,
            iterations_completed: self.iterations,
            total_iterations: self.config.iterations,
            mean: self.stats.returns().mean(),
            confidence_interval: self.stats.returns().confidence_interval(),
            elapsed_ms,
            estimated_remaining_ms,
        }
    }

    fn current_best_path(&self) -> Option<SelectedPath> {
        best_path(
            &self.graph,
            self.stats.arms(),
            self.config.risk_tolerance.score_penalty(),
            self.max_steps(),
        )
    }

    /// Graph annotated with mean sampled values and the current best path
    pub fn snapshot(&self) -> FlowSnapshot {
        let mean_values: Option<Vec<f64>> = (self.iterations > 0).then(|| {
            self.link_value_sums
                .iter()
                .map(|sum| sum / self.iterations as f64)
                .collect()
        });

        let mut on_best_path = vec![false; self.graph.link_count()];
        if let Some(path) = self.current_best_path() {
            for link in path.links {
                on_best_path[link] = true;
            }
        }

        let links = self
            .graph
            .links()
            .iter()
            .enumerate()
            .map(|(idx, link)| {
                let mut annotated = link.clone();
                if let Some(means) = &mean_values {
                    annotated.value = means[idx];
                }
                annotated.enhanced = on_best_path[idx];
                annotated
            })
            .collect();

        let nodes = self
            .graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let incoming = self.graph.incoming(idx);
                let predicted_value = mean_values.as_ref().map(|means| {
                    if incoming.is_empty() {
                        node.value
                    } else {
                        incoming.iter().map(|&link| means[link]).sum()
                    }
                });
                SnapshotNode {
                    node: node.clone(),
                    predicted_value,
                }
            })
            .collect();

        FlowSnapshot { nodes, links }
    }

    /// Final result from the statistics gathered so far
    pub fn result(&self) -> SimulationResult {
        let arms = self.stats.arms();
        let optimal_path: Vec<PathStep> = self
            .current_best_path()
            .map(|path| {
                path.links
                    .iter()
                    .map(|&link_idx| {
                        let link = self.graph.link(link_idx);
                        let from = self.graph.node(link.source);
                        let to = self.graph.node(link.target);
                        let arm = arms.arm(link.source, self.graph.link_position(link_idx));
                        let visits = arms.total_pulls(link.source);

                        PathStep {
                            from: from.id.clone(),
                            to: to.id.clone(),
                            action: action_label(&link.kind, &from.name, &to.name),
                            expected_value: arm.mean().unwrap_or(0.0),
                            confidence: if visits == 0 {
                                0.0
                            } else {
                                arm.pulls as f64 / visits as f64
                            },
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let expected_value = optimal_path.first().map_or(0.0, |step| step.expected_value);

        SimulationResult {
            run_id: self.run_id,
            optimal_path,
            expected_value,
            risk_metrics: self.stats.risk_metrics(self.config.risk_free_rate),
            convergence_achieved: self.stats.is_converged(self.config.iterations),
            converged_at_iteration: self.stats.converged_at(),
            iterations_completed: self.iterations,
            confidence_interval: self.stats.returns().confidence_interval(),
            arms_visited: arms.visited_count(),
            config_hash: self.config_hash.clone(),
        }
    }
}

fn action_label(kind: &str, from: &str, to: &str) -> String {
    if kind.is_empty() {
        format!("{} -> {}", from, to)
    } else {
        format!("{}: {} -> {}", kind, from, to)
    }
}

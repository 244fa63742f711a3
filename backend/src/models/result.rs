//! Value snapshots copied out of a running simulation.
//!
//! Nothing here references engine state: progress and result payloads are
//! built fresh for every emission and owned by whoever receives them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::graph::{FlowLink, FlowNode};

/// Two-sided 95% confidence interval around the running mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn half_width(&self) -> f64 {
        (self.upper - self.lower) / 2.0
    }
}

/// Periodic progress report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationProgress {
    pub run_id: Uuid,
    pub iterations_completed: u64,
    pub total_iterations: u64,

    /// Running mean of path returns
    pub mean: f64,

    /// None until at least two iterations have completed
    pub confidence_interval: Option<ConfidenceInterval>,

    pub elapsed_ms: u64,
    pub estimated_remaining_ms: u64,
}

/// Node annotated with the value the simulation currently predicts for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    #[serde(flatten)]
    pub node: FlowNode,

    /// None until the node has been observed
    pub predicted_value: Option<f64>,
}

/// Graph annotated for visualization
///
/// Link values are the mean sampled values so far; `enhanced` marks links on
/// the current best path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub nodes: Vec<SnapshotNode>,
    pub links: Vec<FlowLink>,
}

/// One step of the recommended path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStep {
    /// Source node ID
    pub from: String,

    /// Target node ID
    pub to: String,

    pub action: String,

    /// Mean return from taking this link onward
    pub expected_value: f64,

    /// Share of visits to `from` that chose this link (0-1)
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    /// Standard deviation of path returns
    pub volatility: f64,

    /// (mean - risk-free rate) / volatility; 0 when volatility is 0
    pub sharpe_ratio: f64,

    /// 5th percentile of recent simulated returns
    pub value_at_risk: f64,

    /// Largest peak-to-trough decline across the return sequence
    pub max_drawdown: f64,
}

/// Terminal result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub run_id: Uuid,
    pub optimal_path: Vec<PathStep>,
    pub expected_value: f64,
    pub risk_metrics: RiskMetrics,
    pub convergence_achieved: bool,

    /// First iteration at which the interval criterion held
    pub converged_at_iteration: Option<u64>,

    pub iterations_completed: u64,
    pub confidence_interval: Option<ConfidenceInterval>,

    /// Number of distinct arms pulled at least once
    pub arms_visited: usize,

    /// SHA-256 of the canonical config + graph JSON
    pub config_hash: String,
}

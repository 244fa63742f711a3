//! Scenario sampling: one stochastic realization of the flow graph per iteration.
//!
//! # Key Principles
//!
//! 1. **Determinism**: Same graph + scenario + RNG state → same perturbed values
//! 2. **Scenario bias**: Each macro-economic regime shifts the mean (drift) and
//!    reshapes the shocks (volatility and skew)
//! 3. **Risk tolerance**: Scales how wide the shocks are
//! 4. **Deterministic links**: A link without an uncertainty descriptor keeps
//!    its nominal value and consumes no draws
//!
//! # Example
//!
//! ```
//! use flow_simulator_core::models::graph::{build_graph, FlowLink, FlowNode, NodeCategory, Uncertainty};
//! use flow_simulator_core::rng::RngManager;
//! use flow_simulator_core::scenarios::{RiskTolerance, Scenario, ScenarioSampler};
//!
//! let graph = build_graph(
//!     vec![
//!         FlowNode::new("revenue", "Revenue", NodeCategory::Income, 100.0),
//!         FlowNode::new("profit", "Profit", NodeCategory::Equity, 100.0),
//!     ],
//!     vec![FlowLink::new(0, 1, 100.0, "operating")
//!         .with_uncertainty(Uncertainty::Normal { std_dev: 0.1 })],
//! )
//! .unwrap();
//!
//! let sampler = ScenarioSampler::new(RiskTolerance::Moderate, 12);
//! let mut rng = RngManager::new(42);
//! let perturbed = sampler.sample(&graph, Scenario::Growth, &mut rng);
//! assert_eq!(perturbed.values.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::models::graph::{FlowGraph, Uncertainty};
use crate::rng::RngManager;

/// Named macro-economic regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Baseline,
    Recession,
    Growth,
}

/// How a scenario biases link shocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioProfile {
    /// Multiplier applied to the nominal value of uncertain links
    pub drift: f64,

    /// Multiplier applied to shock width
    pub volatility: f64,

    /// Weight on negative shocks
    pub downside: f64,

    /// Weight on positive shocks
    pub upside: f64,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Baseline, Scenario::Recession, Scenario::Growth];

    /// Tunable regime constants
    pub fn profile(self) -> ScenarioProfile {
        match self {
            Scenario::Baseline => ScenarioProfile {
                drift: 1.0,
                volatility: 1.0,
                downside: 1.0,
                upside: 1.0,
            },
            Scenario::Recession => ScenarioProfile {
                drift: 0.9,
                volatility: 1.3,
                downside: 1.5,
                upside: 0.7,
            },
            Scenario::Growth => ScenarioProfile {
                drift: 1.08,
                volatility: 1.1,
                downside: 0.8,
                upside: 1.3,
            },
        }
    }
}

/// Appetite for variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    /// Shock width multiplier used while sampling
    pub fn volatility_multiplier(self) -> f64 {
        match self {
            RiskTolerance::Conservative => 0.6,
            RiskTolerance::Moderate => 1.0,
            RiskTolerance::Aggressive => 1.5,
        }
    }

    /// Standard deviations subtracted from an arm's mean when scoring the
    /// recommended path
    pub fn score_penalty(self) -> f64 {
        match self {
            RiskTolerance::Conservative => 1.0,
            RiskTolerance::Moderate => 0.5,
            RiskTolerance::Aggressive => 0.0,
        }
    }
}

/// One realization of every link value in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbedGraph {
    pub scenario: Scenario,

    /// Perturbed value per link, indexed like `FlowGraph::links`
    pub values: Vec<f64>,
}

/// Samples perturbed graphs for a fixed risk tolerance and time horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioSampler {
    risk_tolerance: RiskTolerance,

    /// sqrt(horizon / 12): shocks widen with the square root of time
    horizon_scale: f64,
}

impl ScenarioSampler {
    pub fn new(risk_tolerance: RiskTolerance, time_horizon_months: u32) -> Self {
        Self {
            risk_tolerance,
            horizon_scale: (f64::from(time_horizon_months) / 12.0).sqrt(),
        }
    }

    /// Pick the scenario for one iteration
    ///
    /// A single enabled scenario is returned without consuming a draw.
    pub fn choose_scenario(&self, enabled: &[Scenario], rng: &mut RngManager) -> Scenario {
        enabled
            .get(rng.index(enabled.len()))
            .copied()
            .unwrap_or(Scenario::Baseline)
    }

    /// Draw one perturbed value for every link in the graph
    pub fn sample(&self, graph: &FlowGraph, scenario: Scenario, rng: &mut RngManager) -> PerturbedGraph {
        let profile = scenario.profile();
        let width = profile.volatility * self.risk_tolerance.volatility_multiplier() * self.horizon_scale;

        let values = graph
            .links()
            .iter()
            .map(|link| match &link.uncertainty {
                None => link.value,
                Some(uncertainty) => {
                    let shock = self.sample_shock(uncertainty, width, rng);
                    let skewed = if shock < 0.0 {
                        shock * profile.downside
                    } else {
                        shock * profile.upside
                    };
                    link.value * profile.drift * (1.0 + skewed)
                }
            })
            .collect();

        PerturbedGraph { scenario, values }
    }

    /// Relative shock around zero for one link
    fn sample_shock(&self, uncertainty: &Uncertainty, width: f64, rng: &mut RngManager) -> f64 {
        match *uncertainty {
            Uncertainty::Normal { std_dev } => rng.standard_normal() * std_dev * width,
            Uncertainty::Uniform { low, high } => {
                let u = rng.next_f64();
                (low + u * (high - low)) * width
            }
            Uncertainty::LogNormal { sigma } => {
                let s = sigma * width;
                let z = rng.standard_normal();
                // E[exp(sZ - s²/2)] = 1
                (s * z - 0.5 * s * s).exp() - 1.0
            }
        }
    }
}

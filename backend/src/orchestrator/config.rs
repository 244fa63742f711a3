//! Simulation run configuration
//!
//! A `SimulationConfig` is fixed for the lifetime of one run. It arrives on
//! `START_SIMULATION` (usually as JSON) and is validated before the run
//! starts; a new run needs a new config.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::scenarios::{RiskTolerance, Scenario};

/// Upper bound on `iterations`
pub const MAX_ITERATIONS: u64 = 1_000_000;

/// Upper bound on `time_horizon_months` (50 years)
pub const MAX_TIME_HORIZON_MONTHS: u32 = 600;

/// Upper bound on `exploration_parameter`
pub const MAX_EXPLORATION_PARAMETER: f64 = 10.0;

/// Iterations per batch between control-message checks
pub const DEFAULT_BATCH_SIZE: u64 = 100;

/// Configuration validation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("iterations must be in 1..={max}, got {value}")]
    IterationsOutOfRange { value: u64, max: u64 },

    #[error("explorationParameter must be finite and in [0, {max}], got {value}")]
    ExplorationOutOfRange { value: f64, max: f64 },

    #[error("timeHorizonMonths must be in 1..={max}, got {value}")]
    TimeHorizonOutOfRange { value: u32, max: u32 },

    #[error("at least one scenario must be enabled")]
    NoScenarios,

    #[error("scenario {0:?} listed more than once")]
    DuplicateScenario(Scenario),

    #[error("batchSize must be > 0")]
    InvalidBatchSize,

    #[error("progressInterval must be > 0")]
    InvalidProgressInterval,

    #[error("riskFreeRate must be finite, got {0}")]
    NonFiniteRiskFreeRate(f64),

    #[error("convergenceFraction must be in (0, 1], got {0}")]
    ConvergenceFractionOutOfRange(f64),
}

/// Complete configuration for one simulation run
///
/// # Fields
///
/// * `iterations` - Iteration budget (1..=1,000,000)
/// * `exploration_parameter` - UCB1 constant; ~0.5 exploits, ~2.5 explores
/// * `time_horizon_months` - Horizon; also the maximum path length
/// * `scenarios` - Enabled scenarios, drawn uniformly per iteration
/// * `risk_tolerance` - Scales sampling width and path scoring
/// * `seed` - RNG seed; same seed + config + graph → same run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub iterations: u64,

    pub exploration_parameter: f64,

    pub time_horizon_months: u32,

    pub scenarios: Vec<Scenario>,

    pub risk_tolerance: RiskTolerance,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Iterations between progress snapshots
    #[serde(default = "default_batch_size")]
    pub progress_interval: u64,

    #[serde(default)]
    pub risk_free_rate: f64,

    /// Interval half-width, as a fraction of |mean|, that counts as converged
    #[serde(default = "default_convergence_fraction")]
    pub convergence_fraction: f64,
}

fn default_seed() -> u64 {
    42
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_convergence_fraction() -> f64 {
    0.01
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 1_000,
            exploration_parameter: 1.41,
            time_horizon_months: 12,
            scenarios: vec![Scenario::Baseline],
            risk_tolerance: RiskTolerance::Moderate,
            seed: default_seed(),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_BATCH_SIZE,
            risk_free_rate: 0.0,
            convergence_fraction: default_convergence_fraction(),
        }
    }
}

impl SimulationConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(ConfigError::IterationsOutOfRange {
                value: self.iterations,
                max: MAX_ITERATIONS,
            });
        }

        if !self.exploration_parameter.is_finite()
            || !(0.0..=MAX_EXPLORATION_PARAMETER).contains(&self.exploration_parameter)
        {
            return Err(ConfigError::ExplorationOutOfRange {
                value: self.exploration_parameter,
                max: MAX_EXPLORATION_PARAMETER,
            });
        }

        if self.time_horizon_months == 0 || self.time_horizon_months > MAX_TIME_HORIZON_MONTHS {
            return Err(ConfigError::TimeHorizonOutOfRange {
                value: self.time_horizon_months,
                max: MAX_TIME_HORIZON_MONTHS,
            });
        }

        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }
        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario) {
                return Err(ConfigError::DuplicateScenario(*scenario));
            }
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::InvalidProgressInterval);
        }

        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::NonFiniteRiskFreeRate(self.risk_free_rate));
        }

        if !(self.convergence_fraction > 0.0 && self.convergence_fraction <= 1.0) {
            return Err(ConfigError::ConvergenceFractionOutOfRange(self.convergence_fraction));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_iteration_bounds() {
        let mut config = SimulationConfig::default();
        config.iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::IterationsOutOfRange { .. })));

        config.iterations = MAX_ITERATIONS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::IterationsOutOfRange { .. })));
    }

    #[test]
    fn test_exploration_must_be_finite() {
        let config = SimulationConfig {
            exploration_parameter: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ExplorationOutOfRange { .. })));
    }

    #[test]
    fn test_scenarios_non_empty_and_unique() {
        let mut config = SimulationConfig {
            scenarios: vec![],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoScenarios));

        config.scenarios = vec![Scenario::Growth, Scenario::Growth];
        assert_eq!(config.validate(), Err(ConfigError::DuplicateScenario(Scenario::Growth)));
    }

    #[test]
    fn test_json_defaults_applied() {
        let json = r#"{
            "iterations": 500,
            "explorationParameter": 2.0,
            "timeHorizonMonths": 24,
            "scenarios": ["baseline", "recession"],
            "riskTolerance": "aggressive"
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.risk_tolerance, RiskTolerance::Aggressive);
        assert_eq!(config.scenarios, vec![Scenario::Baseline, Scenario::Recession]);
        assert_eq!(config.validate(), Ok(()));
    }
}

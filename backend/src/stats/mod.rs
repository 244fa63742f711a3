//! Statistics accumulation
//!
//! Single-pass aggregates over the returns of a run:
//!
//! - **RunningStatistics**: Welford mean/variance and the 95% interval
//! - **ReturnHistory**: bounded ring buffer of recent returns (value-at-risk)
//! - **DrawdownTracker**: online peak-to-trough over the return sequence
//! - **StatisticsAccumulator**: folds one iteration into all of the above and
//!   credits the traversed bandit arms
//!
//! No per-iteration history is kept beyond the ring buffer.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::models::graph::FlowGraph;
use crate::models::result::{ConfidenceInterval, RiskMetrics};
use crate::orchestrator::SimulationError;
use crate::policy::bandit::{ArmTable, SelectedPath};

/// z-score of a two-sided 95% interval
pub const Z_95: f64 = 1.959964;

/// Quantile reported as value-at-risk
pub const VAR_QUANTILE: f64 = 0.05;

/// Returns retained for value-at-risk
pub const RETURN_HISTORY_CAPACITY: usize = 10_000;

/// Welford online mean and variance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStatistics {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// 0.0 before the first sample
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; `None` with fewer than 2 samples
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).max(0.0))
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Half-width of the 95% interval for the mean
    pub fn half_width(&self) -> Option<f64> {
        let variance = self.variance()?;
        Some(Z_95 * (variance / self.count as f64).sqrt())
    }

    pub fn confidence_interval(&self) -> Option<ConfidenceInterval> {
        let half_width = self.half_width()?;
        Some(ConfidenceInterval {
            lower: self.mean - half_width,
            upper: self.mean + half_width,
        })
    }
}

/// Bounded ring buffer of the most recent returns
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnHistory {
    buffer: VecDeque<f64>,
    capacity: usize,
}

impl ReturnHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    /// Empirical quantile (nearest rank); `None` when empty
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.buffer.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = (q.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }
}

/// Largest peak-to-trough decline seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawdownTracker {
    peak: Option<f64>,
    max_drawdown: f64,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        let peak = match self.peak {
            Some(peak) if peak >= value => peak,
            _ => value,
        };
        self.peak = Some(peak);
        self.max_drawdown = self.max_drawdown.max(peak - value);
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }
}

/// All running aggregates for one run
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsAccumulator {
    returns: RunningStatistics,
    arms: ArmTable,
    history: ReturnHistory,
    drawdown: DrawdownTracker,
    convergence_fraction: f64,
    converged_at: Option<u64>,
}

impl StatisticsAccumulator {
    pub fn new(graph: &FlowGraph, convergence_fraction: f64) -> Self {
        Self {
            returns: RunningStatistics::new(),
            arms: ArmTable::new(graph),
            history: ReturnHistory::new(RETURN_HISTORY_CAPACITY),
            drawdown: DrawdownTracker::new(),
            convergence_fraction,
            converged_at: None,
        }
    }

    /// Fold one iteration in
    ///
    /// `contributions` holds the signed value of each traversed link. Every
    /// traversed arm is credited with the return from that link to the end
    /// of the path; the root arm gets the full path return, which is also
    /// what is returned.
    ///
    /// # Errors
    ///
    /// `SimulationError::InvariantViolation` when the path and contributions
    /// disagree in length or the path names a link or source the graph does
    /// not have. Nothing is recorded in that case.
    pub fn update(
        &mut self,
        graph: &FlowGraph,
        path: &SelectedPath,
        contributions: &[f64],
    ) -> Result<f64, SimulationError> {
        if path.links.len() != contributions.len() {
            return Err(SimulationError::InvariantViolation(format!(
                "path has {} links but {} contributions",
                path.links.len(),
                contributions.len()
            )));
        }
        if path.source_position >= graph.sources().len() {
            return Err(SimulationError::InvariantViolation(format!(
                "source position {} out of range",
                path.source_position
            )));
        }
        if let Some(&link) = path.links.iter().find(|&&link| link >= graph.link_count()) {
            return Err(SimulationError::InvariantViolation(format!(
                "path references link {} of {}",
                link,
                graph.link_count()
            )));
        }

        let mut return_to_go = 0.0;
        for (&link, &value) in path.links.iter().zip(contributions).rev() {
            return_to_go += value;
            self.arms
                .record(graph.link(link).source, graph.link_position(link), return_to_go);
        }
        let total = return_to_go;
        let root = self.arms.root_row();
        self.arms.record(root, path.source_position, total);

        self.returns.push(total);
        self.history.push(total);
        self.drawdown.push(total);

        if self.converged_at.is_none() && self.interval_converged() {
            self.converged_at = Some(self.returns.count());
        }

        Ok(total)
    }

    /// Whether the 95% half-width is below the configured fraction of |mean|
    fn interval_converged(&self) -> bool {
        match self.returns.half_width() {
            Some(half_width) => half_width < self.convergence_fraction * self.returns.mean().abs(),
            None => false,
        }
    }

    /// Advisory convergence flag: interval criterion or budget exhausted
    pub fn is_converged(&self, iteration_cap: u64) -> bool {
        self.interval_converged() || self.returns.count() >= iteration_cap
    }

    /// Iteration at which the interval criterion first held
    pub fn converged_at(&self) -> Option<u64> {
        self.converged_at
    }

    pub fn returns(&self) -> &RunningStatistics {
        &self.returns
    }

    pub fn arms(&self) -> &ArmTable {
        &self.arms
    }

    pub fn risk_metrics(&self, risk_free_rate: f64) -> RiskMetrics {
        let volatility = self.returns.std_dev().unwrap_or(0.0);
        let sharpe_ratio = if volatility > 0.0 {
            (self.returns.mean() - risk_free_rate) / volatility
        } else {
            0.0
        };

        RiskMetrics {
            volatility,
            sharpe_ratio,
            value_at_risk: self.history.quantile(VAR_QUANTILE).unwrap_or(0.0),
            max_drawdown: self.drawdown.max_drawdown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_matches_two_pass() {
        let values = [3.0, 7.5, -2.0, 11.25, 4.0, 4.0, 0.5];
        let mut stats = RunningStatistics::new();
        for v in values {
            stats.push(v);
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

        assert!((stats.mean() - mean).abs() < 1e-12);
        assert!((stats.variance().unwrap() - var).abs() < 1e-12);
    }

    #[test]
    fn test_interval_needs_two_samples() {
        let mut stats = RunningStatistics::new();
        assert_eq!(stats.confidence_interval(), None);
        stats.push(5.0);
        assert_eq!(stats.half_width(), None);
        stats.push(7.0);
        let ci = stats.confidence_interval().unwrap();
        assert!(ci.lower < 6.0 && ci.upper > 6.0);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut history = ReturnHistory::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.push(v);
        }
        assert_eq!(history.quantile(0.0), Some(2.0));
        assert_eq!(history.quantile(0.5), Some(3.0));
        assert_eq!(history.quantile(1.0), Some(4.0));
    }

    #[test]
    fn test_quantile_nearest_rank() {
        let mut history = ReturnHistory::new(100);
        for v in 1..=100 {
            history.push(v as f64);
        }
        assert_eq!(history.quantile(0.05), Some(5.0));
        assert_eq!(ReturnHistory::new(4).quantile(0.05), None);
    }

    #[test]
    fn test_drawdown_peak_to_trough() {
        let mut dd = DrawdownTracker::new();
        for v in [10.0, 12.0, 5.0, 11.0, 3.0, 20.0, 15.0] {
            dd.push(v);
        }
        assert_eq!(dd.max_drawdown(), 9.0);
    }

    #[test]
    fn test_drawdown_monotone_rise_is_zero() {
        let mut dd = DrawdownTracker::new();
        for v in [1.0, 2.0, 3.0] {
            dd.push(v);
        }
        assert_eq!(dd.max_drawdown(), 0.0);
    }
}

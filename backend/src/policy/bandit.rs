//! UCB1 path selection
//!
//! Every outgoing link of a node is an arm. Arm statistics live in a flat
//! arena indexed by (row, position): one row per node holding its outgoing
//! links in declaration order, plus a root row over the graph's source nodes
//! for graphs with several entry points.
//!
//! # Selection rule
//!
//! ```text
//! score(arm) = normalized_mean(arm) + c * sqrt(ln(total_pulls) / pulls(arm))
//! ```
//!
//! An arm with zero pulls scores +∞, so every arm of a node is tried once (in
//! declaration order) before any arm is exploited. Means are normalized to
//! [0, 1] by the smallest and largest reward credited so far, which keeps the
//! exploration constant `c` meaningful regardless of currency scale. Ties go
//! to the first declared arm.

use serde::{Deserialize, Serialize};

use crate::models::graph::FlowGraph;

/// Per-arm reward statistics
///
/// `mean()` is `None` for an unvisited arm; callers must not treat it as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmStats {
    pub pulls: u64,
    pub cumulative_reward: f64,
    pub cumulative_squared_reward: f64,
}

impl ArmStats {
    pub fn mean(&self) -> Option<f64> {
        if self.pulls == 0 {
            None
        } else {
            Some(self.cumulative_reward / self.pulls as f64)
        }
    }

    /// Population standard deviation of credited rewards
    pub fn std_dev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.cumulative_squared_reward / self.pulls as f64 - mean * mean;
        Some(variance.max(0.0).sqrt())
    }

    fn record(&mut self, reward: f64) {
        self.pulls += 1;
        self.cumulative_reward += reward;
        self.cumulative_squared_reward += reward * reward;
    }
}

/// Arena of arm statistics for one run
#[derive(Debug, Clone, PartialEq)]
pub struct ArmTable {
    arms: Vec<ArmStats>,

    /// Start offset of each row; rows 0..node_count are nodes, the last row
    /// is the root. Has `node_count + 2` entries.
    row_offsets: Vec<usize>,

    reward_floor: f64,
    reward_ceiling: f64,
}

impl ArmTable {
    pub fn new(graph: &FlowGraph) -> Self {
        let mut row_offsets = Vec::with_capacity(graph.node_count() + 2);
        let mut offset = 0;
        for node in 0..graph.node_count() {
            row_offsets.push(offset);
            offset += graph.outgoing(node).len();
        }
        row_offsets.push(offset);
        offset += graph.sources().len();
        row_offsets.push(offset);

        Self {
            arms: vec![ArmStats::default(); offset],
            row_offsets,
            reward_floor: f64::INFINITY,
            reward_ceiling: f64::NEG_INFINITY,
        }
    }

    /// Row index of the virtual root (source selection)
    pub fn root_row(&self) -> usize {
        self.row_offsets.len() - 2
    }

    /// Arms of a row, in declaration order
    pub fn row(&self, row: usize) -> &[ArmStats] {
        &self.arms[self.row_offsets[row]..self.row_offsets[row + 1]]
    }

    pub fn arm(&self, row: usize, position: usize) -> &ArmStats {
        &self.arms[self.row_offsets[row] + position]
    }

    /// Credit a reward to one arm
    pub fn record(&mut self, row: usize, position: usize, reward: f64) {
        let slot = self.row_offsets[row] + position;
        self.arms[slot].record(reward);
        self.reward_floor = self.reward_floor.min(reward);
        self.reward_ceiling = self.reward_ceiling.max(reward);
    }

    /// Number of arms pulled at least once
    pub fn visited_count(&self) -> usize {
        self.arms.iter().filter(|arm| arm.pulls > 0).count()
    }

    pub fn total_pulls(&self, row: usize) -> u64 {
        self.row(row).iter().map(|arm| arm.pulls).sum()
    }

    /// Map a mean reward into [0, 1] using the rewards seen so far
    fn normalize(&self, mean: f64) -> f64 {
        let span = self.reward_ceiling - self.reward_floor;
        if span > 0.0 && span.is_finite() {
            (mean - self.reward_floor) / span
        } else {
            0.0
        }
    }
}

/// A path chosen for one iteration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedPath {
    /// Position of the chosen start node in `FlowGraph::sources`
    pub source_position: usize,

    /// Traversed link indices, in order
    pub links: Vec<usize>,
}

/// UCB1 selector with a fixed exploration constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BanditSelector {
    exploration: f64,
}

impl BanditSelector {
    pub fn new(exploration_parameter: f64) -> Self {
        Self {
            exploration: exploration_parameter,
        }
    }

    /// Choose the next link out of `node`, or `None` for a terminal node
    pub fn select_next_link(&self, graph: &FlowGraph, node: usize, arms: &ArmTable) -> Option<usize> {
        let position = self.choose(arms, node)?;
        Some(graph.outgoing(node)[position])
    }

    /// Choose the start node (as a position in `FlowGraph::sources`)
    pub fn select_source(&self, arms: &ArmTable) -> usize {
        self.choose(arms, arms.root_row()).unwrap_or(0)
    }

    /// Build a full path from a source node
    ///
    /// Stops at a terminal node or after `max_steps` links, whichever comes
    /// first, so it terminates on graphs with cycles.
    pub fn build_path(&self, graph: &FlowGraph, arms: &ArmTable, max_steps: usize) -> SelectedPath {
        let source_position = self.select_source(arms);
        let mut node = graph.sources()[source_position];
        let mut links = Vec::new();

        while links.len() < max_steps {
            match self.select_next_link(graph, node, arms) {
                Some(link) => {
                    links.push(link);
                    node = graph.link(link).target;
                }
                None => break,
            }
        }

        SelectedPath {
            source_position,
            links,
        }
    }

    /// UCB1 over one row; `None` when the row is empty
    fn choose(&self, arms: &ArmTable, row: usize) -> Option<usize> {
        let stats = arms.row(row);
        if stats.is_empty() {
            return None;
        }

        // Cold start: first unvisited arm in declaration order
        if let Some(position) = stats.iter().position(|arm| arm.pulls == 0) {
            return Some(position);
        }

        let ln_total = (arms.total_pulls(row) as f64).ln();
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (position, arm) in stats.iter().enumerate() {
            // pulls > 0 for every arm past the cold-start check
            let mean = arm.cumulative_reward / arm.pulls as f64;
            let bonus = self.exploration * (ln_total / arm.pulls as f64).sqrt();
            let score = arms.normalize(mean) + bonus;
            if score > best_score {
                best = position;
                best_score = score;
            }
        }
        Some(best)
    }
}

/// Greedy path through visited arms, scored by `mean - penalty * std_dev`
///
/// Stops at a terminal node, at a node none of whose arms has been visited,
/// or after `max_steps` links.
pub fn best_path(graph: &FlowGraph, arms: &ArmTable, penalty: f64, max_steps: usize) -> Option<SelectedPath> {
    let source_position = best_visited(arms.row(arms.root_row()), penalty)?;
    let mut node = graph.sources()[source_position];
    let mut links = Vec::new();

    while links.len() < max_steps {
        match best_visited(arms.row(node), penalty) {
            Some(position) => {
                let link = graph.outgoing(node)[position];
                links.push(link);
                node = graph.link(link).target;
            }
            None => break,
        }
    }

    Some(SelectedPath {
        source_position,
        links,
    })
}

fn best_visited(stats: &[ArmStats], penalty: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (position, arm) in stats.iter().enumerate() {
        let (Some(mean), Some(std_dev)) = (arm.mean(), arm.std_dev()) else {
            continue;
        };
        let score = mean - penalty * std_dev;
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((position, score));
        }
    }
    best.map(|(position, _)| position)
}

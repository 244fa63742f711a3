//! Flow graph model
//!
//! The immutable substrate every simulation run perturbs: nodes carrying a
//! nominal value and a category, links referencing nodes by index.
//!
//! A graph is only ever constructed through [`build_graph`] (or by
//! deserializing a [`GraphDefinition`], which goes through the same
//! validation), so every `FlowGraph` in the system satisfies:
//!
//! 1. Every link references in-range node indices
//! 2. All nominal values and uncertainty parameters are finite
//! 3. Every node with outgoing links can reach a terminal node
//!
//! # Example
//!
//! ```
//! use flow_simulator_core::models::graph::{build_graph, FlowLink, FlowNode, NodeCategory};
//!
//! let graph = build_graph(
//!     vec![
//!         FlowNode::new("revenue", "Revenue", NodeCategory::Income, 1000.0),
//!         FlowNode::new("cost", "Cost", NodeCategory::Expense, 600.0),
//!         FlowNode::new("profit", "Profit", NodeCategory::Equity, 400.0),
//!     ],
//!     vec![
//!         FlowLink::new(0, 1, 600.0, "cost"),
//!         FlowLink::new(0, 2, 400.0, "profit"),
//!     ],
//! )
//! .unwrap();
//!
//! assert_eq!(graph.sources(), &[0]);
//! assert!(graph.is_terminal(1));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Errors raised while constructing a [`FlowGraph`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("Graph must contain at least one node")]
    EmptyGraph,

    #[error("Link {link} references node index {index}, but the graph has {node_count} nodes")]
    NodeIndexOutOfRange {
        link: usize,
        index: usize,
        node_count: usize,
    },

    #[error("Duplicate node ID: {0}")]
    DuplicateNodeId(String),

    #[error("Non-finite value on {0}")]
    NonFiniteValue(String),

    #[error("Invalid uncertainty on link {link}: {reason}")]
    InvalidUncertainty { link: usize, reason: String },

    #[error("Node '{node}' has outgoing links but cannot reach any terminal node")]
    TrappingCycle { node: String },
}

/// Financial category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Income,
    Expense,
    Asset,
    Liability,
    Equity,
    Investment,
    Finance,
}

impl NodeCategory {
    /// Whether value flowing into this category counts against a path's return
    pub fn is_outflow(self) -> bool {
        matches!(self, NodeCategory::Expense | NodeCategory::Liability)
    }
}

/// A node in the flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Unique identifier (e.g., "revenue")
    pub id: String,

    /// Display name
    pub name: String,

    pub category: NodeCategory,

    /// Nominal value
    pub value: f64,
}

impl FlowNode {
    pub fn new(id: &str, name: &str, category: NodeCategory, value: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            value,
        }
    }
}

/// Distribution family describing how a link's value varies
///
/// All parameters are relative to the link's nominal value, so a `Normal`
/// with `std_dev = 0.1` means a 10% standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "camelCase")]
pub enum Uncertainty {
    /// Symmetric relative shock with the given standard deviation
    Normal {
        #[serde(rename = "stdDev")]
        std_dev: f64,
    },

    /// Relative shock drawn uniformly from [low, high]
    Uniform { low: f64, high: f64 },

    /// Mean-preserving multiplicative shock (heavy right tail)
    LogNormal { sigma: f64 },
}

impl Uncertainty {
    fn validate(&self) -> Result<(), String> {
        match *self {
            Uncertainty::Normal { std_dev } => {
                if !std_dev.is_finite() || std_dev < 0.0 {
                    return Err(format!("stdDev must be finite and >= 0, got {}", std_dev));
                }
            }
            Uncertainty::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() || low > high {
                    return Err(format!("uniform bounds must be finite with low <= high, got [{}, {}]", low, high));
                }
            }
            Uncertainty::LogNormal { sigma } => {
                if !sigma.is_finite() || sigma < 0.0 {
                    return Err(format!("sigma must be finite and >= 0, got {}", sigma));
                }
            }
        }
        Ok(())
    }
}

/// A directed link between two nodes
///
/// Links hold node indices only; the graph owns the nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowLink {
    /// Source node index
    pub source: usize,

    /// Target node index
    pub target: usize,

    /// Nominal value
    pub value: f64,

    /// Link type tag (e.g., "operating", "tax")
    #[serde(rename = "type", default)]
    pub kind: String,

    /// None = deterministic link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<Uncertainty>,

    /// Marks links surfaced by bandit-guided exploration
    #[serde(default)]
    pub enhanced: bool,
}

impl FlowLink {
    pub fn new(source: usize, target: usize, value: f64, kind: &str) -> Self {
        Self {
            source,
            target,
            value,
            kind: kind.to_string(),
            uncertainty: None,
            enhanced: false,
        }
    }

    /// Attach an uncertainty descriptor
    pub fn with_uncertainty(mut self, uncertainty: Uncertainty) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }
}

/// Plain nodes/links pair as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub nodes: Vec<FlowNode>,
    pub links: Vec<FlowLink>,
}

/// Validated, immutable flow graph
///
/// Adjacency is precomputed at construction: outgoing link indices per node
/// in declaration order, which is also the bandit's tie-break order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphDefinition", into = "GraphDefinition")]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    links: Vec<FlowLink>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    link_positions: Vec<usize>,
    sources: Vec<usize>,
}

/// Build and validate a flow graph
///
/// # Errors
///
/// Returns a [`GraphError`] when the topology or values are invalid; see the
/// module docs for the guaranteed invariants.
pub fn build_graph(nodes: Vec<FlowNode>, links: Vec<FlowLink>) -> Result<FlowGraph, GraphError> {
    if nodes.is_empty() {
        return Err(GraphError::EmptyGraph);
    }

    let mut ids = HashSet::new();
    for node in &nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
        if !node.value.is_finite() {
            return Err(GraphError::NonFiniteValue(format!("node '{}'", node.id)));
        }
    }

    let node_count = nodes.len();
    let mut outgoing = vec![Vec::new(); node_count];
    let mut incoming = vec![Vec::new(); node_count];
    let mut link_positions = Vec::with_capacity(links.len());

    for (idx, link) in links.iter().enumerate() {
        for index in [link.source, link.target] {
            if index >= node_count {
                return Err(GraphError::NodeIndexOutOfRange {
                    link: idx,
                    index,
                    node_count,
                });
            }
        }
        if !link.value.is_finite() {
            return Err(GraphError::NonFiniteValue(format!("link {}", idx)));
        }
        if let Some(uncertainty) = &link.uncertainty {
            uncertainty
                .validate()
                .map_err(|reason| GraphError::InvalidUncertainty { link: idx, reason })?;
        }
        link_positions.push(outgoing[link.source].len());
        outgoing[link.source].push(idx);
        incoming[link.target].push(idx);
    }

    // Reverse BFS from terminals: every node that can reach one
    let mut reaches_terminal = vec![false; node_count];
    let mut queue: VecDeque<usize> = (0..node_count).filter(|&n| outgoing[n].is_empty()).collect();
    for &n in &queue {
        reaches_terminal[n] = true;
    }
    while let Some(n) = queue.pop_front() {
        for &link_idx in &incoming[n] {
            let upstream = links[link_idx].source;
            if !reaches_terminal[upstream] {
                reaches_terminal[upstream] = true;
                queue.push_back(upstream);
            }
        }
    }
    if let Some(trapped) = (0..node_count).find(|&n| !reaches_terminal[n]) {
        return Err(GraphError::TrappingCycle {
            node: nodes[trapped].id.clone(),
        });
    }

    // Nodes with outflow but no inflow start paths. Isolated nodes never do.
    // Without such a node, fall back to the first node with outflow, then to
    // the first declared node.
    let mut sources: Vec<usize> = (0..node_count)
        .filter(|&n| incoming[n].is_empty() && !outgoing[n].is_empty())
        .collect();
    if sources.is_empty() {
        sources.push((0..node_count).find(|&n| !outgoing[n].is_empty()).unwrap_or(0));
    }

    Ok(FlowGraph {
        nodes,
        links,
        outgoing,
        incoming,
        link_positions,
        sources,
    })
}

impl TryFrom<GraphDefinition> for FlowGraph {
    type Error = GraphError;

    fn try_from(def: GraphDefinition) -> Result<Self, Self::Error> {
        build_graph(def.nodes, def.links)
    }
}

impl From<FlowGraph> for GraphDefinition {
    fn from(graph: FlowGraph) -> Self {
        GraphDefinition {
            nodes: graph.nodes,
            links: graph.links,
        }
    }
}

impl FlowGraph {
    pub fn nodes(&self) -> &[FlowNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[FlowLink] {
        &self.links
    }

    pub fn node(&self, index: usize) -> &FlowNode {
        &self.nodes[index]
    }

    pub fn link(&self, index: usize) -> &FlowLink {
        &self.links[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Outgoing link indices of a node, in declaration order
    pub fn outgoing(&self, node: usize) -> &[usize] {
        &self.outgoing[node]
    }

    /// Incoming link indices of a node, in declaration order
    pub fn incoming(&self, node: usize) -> &[usize] {
        &self.incoming[node]
    }

    /// Position of a link within its source's outgoing list
    pub fn link_position(&self, link: usize) -> usize {
        self.link_positions[link]
    }

    /// Designated path start nodes
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    pub fn is_terminal(&self, node: usize) -> bool {
        self.outgoing[node].is_empty()
    }

    /// Signed contribution of a link value to a path's return
    pub fn signed_value(&self, link: usize, value: f64) -> f64 {
        if self.nodes[self.links[link].target].category.is_outflow() {
            -value
        } else {
            value
        }
    }
}

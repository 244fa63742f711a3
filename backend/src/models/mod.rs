//! Domain types
//!
//! - **graph**: the immutable flow graph and its validation
//! - **result**: progress and result snapshots handed to the caller

pub mod graph;
pub mod result;

pub use graph::{
    build_graph, FlowGraph, FlowLink, FlowNode, GraphDefinition, GraphError, NodeCategory,
    Uncertainty,
};
pub use result::{
    ConfidenceInterval, FlowSnapshot, PathStep, RiskMetrics, SimulationProgress, SimulationResult,
    SnapshotNode,
};

//! Run fingerprinting
//!
//! A run is reproducible from its config and graph alone (the seed lives in
//! the config). The fingerprint lets a caller confirm two results came from
//! identical inputs.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::graph::FlowGraph;
use crate::orchestrator::config::SimulationConfig;
use crate::orchestrator::engine::SimulationError;

#[derive(Serialize)]
struct RunInputs<'a> {
    config: &'a SimulationConfig,
    graph: &'a FlowGraph,
}

/// SHA-256 over the canonical JSON (sorted keys) of config + graph
pub fn compute_config_hash(config: &SimulationConfig, graph: &FlowGraph) -> Result<String, SimulationError> {
    let value = serde_json::to_value(RunInputs { config, graph })
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Recursively sort object keys
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

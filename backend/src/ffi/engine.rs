//! PyO3 wrapper for the background engine

use std::time::Duration;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::events::types::ControlMessage;
use crate::runtime::FlowEngine;

/// Python handle to a background simulation engine
///
/// # Example (from Python)
///
/// ```python
/// from flow_simulator_core import FlowEngine
///
/// engine = FlowEngine.new()
/// engine.send('{"type": "START_SIMULATION", "config": {...}, "initialGraph": {...}}')
/// while (event := engine.poll(1000)) is not None:
///     print(event)
/// ```
#[pyclass(name = "FlowEngine")]
pub struct PyFlowEngine {
    inner: FlowEngine,
}

#[pymethods]
impl PyFlowEngine {
    /// Spawn an engine in the idle state
    #[staticmethod]
    fn new() -> PyResult<Self> {
        let inner = FlowEngine::spawn()
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to start engine: {}", e)))?;
        Ok(PyFlowEngine { inner })
    }

    /// Send one control message as JSON
    ///
    /// Raises ValueError if the JSON is not a control message. Messages that
    /// are invalid for the current state are reported as `SIMULATION_ERROR`
    /// events instead.
    fn send(&self, message: &str) -> PyResult<()> {
        let message: ControlMessage = serde_json::from_str(message)
            .map_err(|e| PyErr::new::<PyValueError, _>(format!("Invalid control message: {}", e)))?;
        self.inner
            .send(message)
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(e.to_string()))
    }

    /// Next event as JSON, waiting up to `timeout_ms`
    ///
    /// Returns None on timeout. The GIL is released while waiting.
    #[pyo3(signature = (timeout_ms = 0))]
    fn poll(&self, py: Python<'_>, timeout_ms: u64) -> PyResult<Option<String>> {
        let event = if timeout_ms == 0 {
            self.inner.try_recv()
        } else {
            let events = self.inner.events().clone();
            py.allow_threads(move || events.recv_timeout(Duration::from_millis(timeout_ms)).ok())
        };

        event
            .map(|event| serde_json::to_string(&event))
            .transpose()
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to encode event: {}", e)))
    }
}

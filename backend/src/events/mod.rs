//! Control protocol between a host and the background engine

pub mod types;

pub use types::{ControlMessage, EngineEvent};

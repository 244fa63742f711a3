//! Python bindings
//!
//! The engine is exposed as a single class speaking the JSON wire format of
//! [`crate::events`], so the Python side needs no mirror of the Rust types.

pub mod engine;

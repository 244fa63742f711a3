//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. All randomness in a simulation run MUST go
//! through this module; there is no hidden global generator.

mod xorshift;

pub use xorshift::RngManager;

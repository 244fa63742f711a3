//! xorshift64* random number generator
//!
//! A fast, deterministic PRNG used for every stochastic draw in a run.
//!
//! # Determinism
//!
//! Same seed → same sequence of draws. The scheduler seeds one generator per
//! run and threads it through scenario selection and link sampling, so a run
//! advanced with `STEP` is bit-identical to the same run played straight
//! through.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use flow_simulator_core::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let index = rng.index(3);
/// assert!(index < 3);
/// # let _ = value;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit, never zero)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is remapped to 1 because xorshift is stuck at zero.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Pick an index in `0..len` uniformly.
    ///
    /// Returns 0 without consuming a draw when `len <= 1`, so single-choice
    /// picks never perturb the sequence.
    pub fn index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        (self.next() % len as u64) as usize
    }

    /// Get current RNG state
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Top 53 bits scaled by 2^-53
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Sample a standard normal variate using the Box-Muller transform.
    ///
    /// Always consumes exactly two draws.
    pub fn standard_normal(&mut self) -> f64 {
        // 1 - u keeps the log argument in (0, 1]
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

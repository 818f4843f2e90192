use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform `(0, 1]` source for layer sampling (spec §6).
///
/// Wraps `rand::rngs::StdRng` rather than exposing `rand::Rng` directly
/// at the index boundary, so callers get determinism from a seed without
/// needing to pick a generator themselves. Not cryptographic; doesn't
/// need to be.
#[derive(Debug, Clone)]
pub struct SeededRng(StdRng);

impl SeededRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Draws from `(0, 1]`. `rand`'s `gen::<f64>()` samples `[0, 1)`; we
    /// flip it so the level-sampling formula `-ln(u)` never sees `u = 0`
    /// (which would yield `+inf`).
    pub fn sample_unit(&mut self) -> f64 {
        1.0 - self.0.gen::<f64>()
    }
}

impl Default for SeededRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

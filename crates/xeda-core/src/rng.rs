//! Seeded RNG wrapper used for search jitter.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// RNG handle exposed to xeda consumers.
///
/// Every source of randomness in a search run goes through one handle so
/// that a run can be replayed from the seed recorded in its provenance. A
/// caller that does not care about replay draws a fresh seed with
/// [`RngHandle::from_entropy`] and reads it back through [`RngHandle::seed`].
#[derive(Debug, Clone)]
pub struct RngHandle {
    seed: u64,
    rng: StdRng,
}

impl RngHandle {
    /// Handle replaying the stream of `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a handle from an OS-provided seed.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random())
    }

    /// Seed this handle was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform sample in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

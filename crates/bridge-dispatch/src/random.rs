//! Injectable randomness for template selection and jitter.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Source of the uniform draws a bulk job needs.
pub trait RandomSource: Send {
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;

    /// Uniform value in `[low, high]`. Returns `low` when the range is empty.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

/// `RandomSource` backed by any `rand` generator.
pub struct RngSource<R>(R);

impl RngSource<StdRng> {
    /// Generator seeded from the operating system.
    #[must_use]
    pub fn from_os() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Reproducible generator.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> RandomSource for RngSource<R> {
    fn pick(&mut self, len: usize) -> usize {
        self.0.random_range(0..len.max(1))
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.0.random_range(low..=high)
        } else {
            low
        }
    }
}

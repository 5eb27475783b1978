//! Seeded inputs and the CPU reference computation.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

/// The two input vectors of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct HostInputs {
    pub seed: u64,
    pub a: Vec<f32>,
    pub b: Vec<f32>,
}

impl HostInputs {
    /// Draw `len` values in `[0, 1)` for each vector from a generator seeded
    /// with `seed`.
    pub fn generate(len: usize, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let a = (0..len).map(|_| rng.gen::<f32>()).collect();
        let b = (0..len).map(|_| rng.gen::<f32>()).collect();
        Self { seed, a, b }
    }

    /// Wrap caller-provided vectors.
    ///
    /// # Panics
    ///
    /// Panics if `a` and `b` differ in length.
    pub fn from_vecs(a: Vec<f32>, b: Vec<f32>) -> Self {
        assert_eq!(a.len(), b.len(), "input vectors must have equal length");
        Self { seed: 0, a, b }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// Result of the CPU reference computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRun {
    pub output: Vec<f32>,
    pub elapsed: Duration,
}

impl ReferenceRun {
    /// Compute `a + b` on the host, timing it with a monotonic clock.
    pub fn compute(inputs: &HostInputs) -> Self {
        let mut output = vec![0.0f32; inputs.len()];
        let start = Instant::now();
        vector_add(&inputs.a, &inputs.b, &mut output);
        let elapsed = start.elapsed();
        debug!(len = inputs.len(), elapsed_us = elapsed.as_micros(), "cpu reference computed");
        Self { output, elapsed }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Elementwise single-precision add.
pub fn vector_add(a: &[f32], b: &[f32], out: &mut [f32]) {
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x + y;
    }
}

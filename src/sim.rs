//! Deterministic randomness for fault injection and synthetic payloads.
//!
//! Everything random in a probe run flows through [`Rng`], so a run against
//! a [`SimulatedObjectStore`](crate::storage::SimulatedObjectStore) with a
//! given seed replays the exact same fault sequence.

/// Minimal RNG surface used by the simulated store.
pub trait Rng: Send + 'static {
    fn next_u64(&mut self) -> u64;

    /// `true` with the given probability (clamped to `[0, 1]`).
    fn gen_bool(&mut self, probability: f64) -> bool;

    /// Uniform in `[min, max)`. Returns `min` when the range is empty.
    fn gen_range(&mut self, min: u64, max: u64) -> u64;
}

/// Seeded ChaCha8 generator.
#[derive(Debug, Clone)]
pub struct SimulatedRng {
    inner: rand_chacha::ChaCha8Rng,
}

impl SimulatedRng {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        SimulatedRng {
            inner: rand_chacha::ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Fill `buf` from the stream.
    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        use rand::RngCore;
        self.inner.fill_bytes(buf);
    }
}

impl Rng for SimulatedRng {
    fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    fn gen_bool(&mut self, probability: f64) -> bool {
        use rand::Rng;
        self.inner.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        use rand::Rng;
        if min >= max {
            return min;
        }
        self.inner.gen_range(min..max)
    }
}

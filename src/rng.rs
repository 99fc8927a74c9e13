//! Random number streams.
//!
//! Every process draws from its own named ChaCha stream. Streams are seeded
//! from a master generator in first-use order, so a fixed process list
//! reproduces the same draws for the same scenario seed.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of uniform variates in `[0, 1)`.
pub trait RandomGenerator {
    fn next_uniform(&mut self) -> f64;
}

impl RandomGenerator for ChaCha8Rng {
    fn next_uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Named streams keyed by process name. A stream is seeded from the master
/// generator the first time its name is requested.
pub struct RngManager {
    master: ChaCha8Rng,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: HashMap::new(),
        }
    }

    pub fn stream(&mut self, name: &str) -> ProcessRng<'_> {
        let master = &mut self.master;
        let inner = self
            .streams
            .entry(name.to_owned())
            .or_insert_with(|| ChaCha8Rng::from_seed(master.gen()));
        ProcessRng { inner }
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }
}

/// A process's borrowed view of its stream.
pub struct ProcessRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl RandomGenerator for ProcessRng<'_> {
    fn next_uniform(&mut self) -> f64 {
        self.inner.next_uniform()
    }
}

/// Always returns the same value. Useful for pinning stochastic branches in tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedUniform(pub f64);

impl RandomGenerator for FixedUniform {
    fn next_uniform(&mut self) -> f64 {
        self.0
    }
}

/// Cycles through a fixed list of values.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceUniform {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceUniform {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomGenerator for SequenceUniform {
    fn next_uniform(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}

//! Durable id generation.
//!
//! Ids are 128 random bits rendered as 32 lowercase hex characters. A seeded
//! [`Pcg64`] makes the sequence reproducible for tests and demos.
//!
//! A seeded generator is also keyed by an epoch, the last sequence the sink
//! persisted before the graph opened. Every session that persists anything
//! moves the epoch forward, so a reopened graph never replays the stream
//! that produced ids already handed out, including ids of entities deleted
//! since.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

#[derive(Debug, Clone)]
pub struct IdGenerator {
    rng: Pcg64,
}

/// Odd multiplier, so distinct epochs map to distinct stream seeds.
const EPOCH_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

impl IdGenerator {
    /// Entropy-seeded when `seed` is `None`; `epoch` only matters for a
    /// seeded generator.
    pub fn new(seed: Option<u64>, epoch: u64) -> Self {
        let rng = match seed {
            Some(seed) => Pcg64::seed_from_u64(seed ^ epoch.wrapping_mul(EPOCH_MIX)),
            None => Pcg64::from_entropy(),
        };
        Self { rng }
    }

    /// Next candidate id. Uniqueness against live ids is the caller's check.
    pub fn next_id(&mut self) -> String {
        let bits: u128 = self.rng.gen();
        format!("{bits:032x}")
    }
}

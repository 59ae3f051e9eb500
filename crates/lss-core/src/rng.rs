//! Deterministic random streams for procedurally generated catalogs.

use std::hash::Hasher;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip::SipHasher13;

/// Derives the seed of the stream named `label` from a catalog seed.
///
/// The rule hashes `(seed, label)` with SipHash-1-3 under fixed zero keys, so
/// the value is stable across platforms and independent of how many other
/// streams were drawn before.
pub fn derive_stream_seed(seed: u64, label: &str) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(seed);
    hasher.write(label.as_bytes());
    hasher.finish()
}

/// Random stream dedicated to one column of a generated catalog.
///
/// Each column draws from its own stream, so requesting `Velocity` alone
/// yields the same values as requesting `Position` and `Velocity` together.
#[derive(Debug, Clone)]
pub struct ColumnStream {
    rng: StdRng,
}

impl ColumnStream {
    /// Opens the stream for `label` under the catalog seed.
    pub fn new(seed: u64, label: &str) -> Self {
        Self {
            rng: StdRng::seed_from_u64(derive_stream_seed(seed, label)),
        }
    }

    /// Draws `count` values uniformly from `[low, high)`.
    ///
    /// A degenerate interval (`low == high`) yields `low` repeatedly.
    pub fn uniform(&mut self, count: usize, low: f64, high: f64) -> Vec<f64> {
        if high <= low {
            return vec![low; count];
        }
        (0..count).map(|_| self.rng.gen_range(low..high)).collect()
    }
}

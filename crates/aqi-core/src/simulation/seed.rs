//! Keyed, independently seeded random streams
//!
//! Every simulated value is drawn from a fresh stream seeded from a string
//! key, so identical keys yield identical values across calls, threads and
//! processes, and no caller can disturb another caller's sequence.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use sha2::{Digest, Sha256};

/// Low 32 bits of the SHA-256 digest of `key`
pub fn seed_for(key: &str) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let tail: [u8; 4] = [digest[28], digest[29], digest[30], digest[31]];
    u32::from_be_bytes(tail)
}

/// A private pseudo-random stream for one simulation call
pub struct SeededStream {
    rng: ChaCha8Rng,
}

impl SeededStream {
    /// Stream seeded from the hash of `key`
    pub fn from_key(key: &str) -> Self {
        Self::from_seed(u64::from(seed_for(key)))
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw from N(mean, std_dev). A non-positive deviation returns `mean`.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        match Normal::new(mean, std_dev) {
            Ok(dist) if std_dev > 0.0 => dist.sample(&mut self.rng),
            _ => mean,
        }
    }

    /// Draw from U[low, high). An empty interval returns `low`.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }
}

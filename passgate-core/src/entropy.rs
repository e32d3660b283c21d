//! Injectable randomness for challenge values and operation ids.

use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

/// Cryptographically secure randomness source.
///
/// Challenge values and step-up operation ids are minted from this trait so
/// tests can substitute a deterministic source.
pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]);

    /// Convenience: a fresh random byte vector of the given length.
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf);
        buf
    }
}

/// Production entropy from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// Deterministic seeded entropy.
/// WARNING: Do not use in production - for testing only!
pub struct MockEntropy {
    rng: Mutex<StdRng>,
}

impl MockEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for MockEntropy {
    fn default() -> Self {
        Self::new(0xDEADBEEF_CAFEBABE)
    }
}

impl EntropySource for MockEntropy {
    fn fill(&self, dest: &mut [u8]) {
        self.rng.lock().expect("entropy lock poisoned").fill_bytes(dest);
    }
}

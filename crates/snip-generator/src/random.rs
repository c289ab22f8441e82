use crate::Generator;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snip_core::ShortCode;

/// Base58 alphabet: URL-safe and free of look-alike characters (0, O, I, l).
const ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub const DEFAULT_LENGTH: usize = 8;

/// Generates random fixed-length codes over the base58 alphabet.
///
/// With the default length there are 58^8 (about 1.3e14) codes, so
/// collisions are rare; the backend retries on the ones that happen.
#[derive(Debug)]
pub struct RandomGenerator {
    rng: Mutex<StdRng>,
    length: usize,
}

impl RandomGenerator {
    /// Creates a generator seeded from the operating system.
    pub fn new() -> Self {
        Self::with_length(DEFAULT_LENGTH)
    }

    pub fn with_length(length: usize) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            length: length.max(1),
        }
    }

    /// Creates a reproducible generator. Two generators built from the same
    /// seed produce the same sequence of codes.
    pub fn seeded(seed: u64, length: usize) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    fn generate(&self, _seed: &str) -> ShortCode {
        let mut rng = self.rng.lock();
        let code: String = (0..self.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        ShortCode::new_unchecked(code)
    }
}

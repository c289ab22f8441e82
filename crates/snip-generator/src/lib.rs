pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use snip_core::ShortCode;
use std::sync::Arc;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage and
/// have no knowledge of already issued codes. Backends detect collisions
/// and call [`Generator::generate`] again.
///
/// Implementations can vary from random tokens to counters or digests of the
/// seed.
pub trait Generator: Send + Sync + 'static {
    /// Generates a candidate short code. `seed` is the URL being shortened;
    /// implementations may ignore it.
    fn generate(&self, seed: &str) -> ShortCode;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn generate(&self, seed: &str) -> ShortCode {
        (**self).generate(seed)
    }
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&self, seed: &str) -> ShortCode {
        (**self).generate(seed)
    }
}

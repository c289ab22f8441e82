use crate::Generator;
use snip_core::ShortCode;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter-based codes: `{prefix}000000`, `{prefix}000001`, ...
///
/// Predictable output for tests. The seed is ignored.
#[derive(Debug)]
pub struct SeqGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 0)
    }

    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(first),
        }
    }
}

impl Generator for SeqGenerator {
    fn generate(&self, _seed: &str) -> ShortCode {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ShortCode::new_unchecked(format!("{}{n:06}", self.prefix))
    }
}

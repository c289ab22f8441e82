use crate::batch::{BatchEntry, BatchReport};
use crate::error::{Result, StorageError};
use crate::record::{SaveOutcome, UserUrl};
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::fmt::Display;

/// Number of codes a backend tries before giving up on a single save.
pub const MAX_GENERATE_ATTEMPTS: usize = 5;

/// The kind of backend behind a [`Storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Process-local index only.
    Memory,
    /// Process-local index mirrored to an append-only file.
    File,
    /// PostgreSQL.
    Postgres,
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Memory => f.write_str("memory"),
            Backend::File => f.write_str("file"),
            Backend::Postgres => f.write_str("postgres"),
        }
    }
}

/// The storage contract every backend satisfies.
///
/// Implementations are shared between concurrent request handlers. A save is
/// an atomic check-then-insert: at most one code exists per `(url, owner)`
/// pair and codes are unique within a backend. Dropping a returned future
/// cancels the operation without leaving a partially written record behind.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Saves `url` for `owner_id` and returns its code.
    ///
    /// Returns [`SaveOutcome::Existing`] with the previously issued code if the
    /// pair is already stored.
    async fn save_url(&self, url: &str, owner_id: &str) -> Result<SaveOutcome>;

    /// Saves every entry independently and reports each outcome.
    async fn save_batch_url(
        &self,
        base_url: &str,
        entries: &[BatchEntry],
        owner_id: &str,
    ) -> Result<BatchReport>;

    /// Resolves a code to its original URL.
    /// Returns [`StorageError::NotFound`] if the code was never issued.
    async fn get_url(&self, code: &ShortCode) -> Result<String>;

    /// Lists every record owned by `owner_id`. Anonymous owners own nothing.
    async fn get_user_urls(&self, base_url: &str, owner_id: &str) -> Result<Vec<UserUrl>>;

    /// Checks that the backend is reachable.
    async fn check_connect(&self) -> Result<()>;

    /// Releases backend resources. Call once, after in-flight calls drained.
    async fn close(&self) -> Result<()>;

    fn backend(&self) -> Backend;
}

/// Rejects the empty URL, which no backend stores.
pub fn require_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(StorageError::InvalidData("original url is empty".to_string()));
    }
    Ok(())
}

use crate::journal::ReplayReport;
use crate::memory::MemoryStorage;
use crate::postgres::PostgresStorage;
use snip_core::{
    Backend, BatchEntry, BatchReport, Result, SaveOutcome, ShortCode, Storage, StorageError,
    UserUrl,
};
use snip_generator::Generator;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Selects and configures the backend behind a [`Store`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct StoreConfig {
    /// PostgreSQL connection string. Takes precedence over the file path.
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,
    /// Journal file for the in-memory backend.
    #[builder(default, setter(strip_option, into))]
    pub file_storage_path: Option<PathBuf>,
    /// Deadline applied to every operation.
    #[builder(default, setter(strip_option))]
    pub operation_timeout: Option<Duration>,
    /// Sync each journal append to disk before acknowledging it.
    #[builder(default = true)]
    pub fsync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A freshly opened [`Store`].
#[derive(Clone)]
pub struct Opened {
    pub store: Store,
    /// Present when the store was rebuilt from a journal.
    pub replay: Option<ReplayReport>,
}

/// Entry point to URL storage.
///
/// Holds exactly one backend, chosen once at startup, and forwards every
/// operation to it unchanged. Callers depend only on this type, never on a
/// concrete backend. Cloning is cheap; clones share the backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Storage>,
    operation_timeout: Option<Duration>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend.backend())
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl Store {
    /// Wraps an already constructed backend.
    pub fn new(backend: impl Storage) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn Storage>) -> Self {
        Self {
            backend,
            operation_timeout: None,
        }
    }

    /// Applies `timeout` to every subsequent operation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Opens the backend described by `config`.
    ///
    /// A database DSN selects PostgreSQL, otherwise a file path selects the
    /// journal-backed memory backend, otherwise records live in memory only.
    /// Failing to reach the database or to open the journal is an error.
    pub async fn open<G: Generator>(config: &StoreConfig, generator: G) -> Result<Opened> {
        let (store, replay) = match (&config.database_dsn, &config.file_storage_path) {
            (Some(dsn), _) if !dsn.is_empty() => {
                let storage = PostgresStorage::connect(dsn, generator).await?;
                (Store::new(storage), None)
            }
            (_, Some(path)) if !path.as_os_str().is_empty() => {
                let path = path.clone();
                let fsync = config.fsync;
                let (storage, report) = tokio::task::spawn_blocking(move || {
                    MemoryStorage::open(generator, path, fsync)
                })
                .await
                .map_err(|e| StorageError::Operation(format!("journal replay aborted: {e}")))??;
                (Store::new(storage), Some(report))
            }
            _ => (Store::new(MemoryStorage::new(generator)), None),
        };

        Ok(Opened {
            store: store.with_timeout(config.operation_timeout),
            replay,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend.backend()
    }

    async fn deadline<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                StorageError::Timeout(format!("{op} exceeded {}ms", limit.as_millis()))
            })?,
            None => fut.await,
        }
    }

    pub async fn save_url(&self, url: &str, owner_id: &str) -> Result<SaveOutcome> {
        self.deadline("save_url", self.backend.save_url(url, owner_id))
            .await
    }

    pub async fn save_batch_url(
        &self,
        base_url: &str,
        entries: &[BatchEntry],
        owner_id: &str,
    ) -> Result<BatchReport> {
        if entries.is_empty() {
            return Ok(BatchReport::default());
        }
        self.deadline(
            "save_batch_url",
            self.backend.save_batch_url(base_url, entries, owner_id),
        )
        .await
    }

    pub async fn get_url(&self, code: &ShortCode) -> Result<String> {
        self.deadline("get_url", self.backend.get_url(code)).await
    }

    pub async fn get_user_urls(&self, base_url: &str, owner_id: &str) -> Result<Vec<UserUrl>> {
        self.deadline("get_user_urls", self.backend.get_user_urls(base_url, owner_id))
            .await
    }

    /// Liveness probe: succeeds when the backend is reachable. Not retried.
    pub async fn check_connect(&self) -> Result<()> {
        self.deadline("check_connect", self.backend.check_connect())
            .await
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }
}

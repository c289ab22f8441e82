use crate::journal::{Journal, ReplayReport, SkippedLine};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use snip_core::{
    require_url, Backend, BatchCollector, BatchEntry, BatchReport, Result, SaveOutcome,
    ShortCode, Storage, StorageError, UrlRecord, UserUrl, MAX_GENERATE_ATTEMPTS,
};
use snip_generator::Generator;
use std::path::Path;

/// Dedup key: one code per URL and owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey {
    original_url: String,
    owner_id: String,
}

impl PairKey {
    fn new(original_url: &str, owner_id: &str) -> Self {
        Self {
            original_url: original_url.to_owned(),
            owner_id: owner_id.to_owned(),
        }
    }
}

/// In-memory implementation of the [`Storage`] trait using DashMap,
/// optionally mirrored to an append-only [`Journal`].
///
/// Three indexes are kept: code to record, `(url, owner)` to code, and owner
/// to codes. A save holds the `(url, owner)` entry for its whole
/// check-then-insert, then the code entry, then the owner entry; that lock
/// order is the same for every writer so concurrent saves cannot deadlock,
/// and two saves of the same pair cannot both insert. The journal line is
/// written while those entries are held and before any index changes.
#[derive(Debug)]
pub struct MemoryStorage<G> {
    records: DashMap<ShortCode, UrlRecord>,
    pairs: DashMap<PairKey, ShortCode>,
    owners: DashMap<String, Vec<ShortCode>>,
    generator: G,
    journal: Option<Journal>,
}

impl<G: Generator> MemoryStorage<G> {
    /// Creates a process-local storage that forgets everything on exit.
    pub fn new(generator: G) -> Self {
        Self {
            records: DashMap::new(),
            pairs: DashMap::new(),
            owners: DashMap::new(),
            generator,
            journal: None,
        }
    }

    /// Opens a storage mirrored to the journal at `path`.
    ///
    /// Every record in the journal is restored before this returns.
    /// Undecodable lines and lines repeating a restored code or
    /// `(url, owner)` pair are skipped and listed in the report.
    pub fn open(
        generator: G,
        path: impl AsRef<Path>,
        fsync: bool,
    ) -> Result<(Self, ReplayReport)> {
        let (journal, replay) = Journal::open(path, fsync)?;

        let mut storage = Self::new(generator);
        let mut report = ReplayReport {
            path: journal.path().to_path_buf(),
            loaded: 0,
            skipped: replay.skipped,
        };

        for (line, record) in replay.records {
            if storage.restore(record) {
                report.loaded += 1;
            } else {
                report.skipped.push(SkippedLine {
                    line,
                    reason: "duplicate of an earlier record".to_string(),
                });
            }
        }
        report.skipped.sort_by_key(|skipped| skipped.line);

        storage.journal = Some(journal);
        Ok((storage, report))
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn restore(&self, record: UrlRecord) -> bool {
        let Entry::Vacant(pair) = self
            .pairs
            .entry(PairKey::new(&record.original_url, &record.owner_id))
        else {
            return false;
        };
        let Entry::Vacant(slot) = self.records.entry(record.code.clone()) else {
            return false;
        };

        let code = record.code.clone();
        if !record.is_anonymous() {
            self.owners
                .entry(record.owner_id.clone())
                .or_default()
                .push(code.clone());
        }
        slot.insert(record);
        pair.insert(code);
        true
    }

    fn save(&self, url: &str, owner_id: &str) -> Result<SaveOutcome> {
        require_url(url)?;

        let pair = match self.pairs.entry(PairKey::new(url, owner_id)) {
            Entry::Occupied(existing) => return Ok(SaveOutcome::Existing(existing.get().clone())),
            Entry::Vacant(pair) => pair,
        };

        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let code = self.generator.generate(url);
            let Entry::Vacant(slot) = self.records.entry(code.clone()) else {
                continue;
            };

            let record = UrlRecord::new(code.clone(), url, owner_id);
            // Blocking write with the entries held: a durable save occupies
            // its worker thread for one append, plus one sync with fsync on.
            if let Some(journal) = &self.journal {
                journal.append(&record)?;
            }

            if !record.is_anonymous() {
                self.owners
                    .entry(owner_id.to_owned())
                    .or_default()
                    .push(code.clone());
            }
            slot.insert(record);
            pair.insert(code.clone());
            return Ok(SaveOutcome::Created(code));
        }

        Err(StorageError::CollisionExhausted {
            attempts: MAX_GENERATE_ATTEMPTS,
        })
    }
}

#[async_trait]
impl<G: Generator> Storage for MemoryStorage<G> {
    async fn save_url(&self, url: &str, owner_id: &str) -> Result<SaveOutcome> {
        self.save(url, owner_id)
    }

    async fn save_batch_url(
        &self,
        base_url: &str,
        entries: &[BatchEntry],
        owner_id: &str,
    ) -> Result<BatchReport> {
        let mut batch = BatchCollector::new(base_url, entries.len());

        for entry in entries {
            if !batch.claim(entry) {
                continue;
            }
            match self.save(&entry.original_url, owner_id) {
                Ok(outcome) => batch.succeed(entry.correlation_id.as_str(), &outcome),
                Err(err) => batch.fail(entry.correlation_id.as_str(), err),
            }
            // Entries already saved stay saved if the caller stops waiting here.
            tokio::task::yield_now().await;
        }

        Ok(batch.finish())
    }

    async fn get_url(&self, code: &ShortCode) -> Result<String> {
        self.records
            .get(code)
            .map(|record| record.original_url.clone())
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn get_user_urls(&self, base_url: &str, owner_id: &str) -> Result<Vec<UserUrl>> {
        if owner_id.is_empty() {
            return Ok(Vec::new());
        }

        let Some(codes) = self.owners.get(owner_id).map(|codes| codes.value().clone()) else {
            return Ok(Vec::new());
        };

        Ok(codes
            .iter()
            .filter_map(|code| {
                self.records.get(code).map(|record| UserUrl {
                    short_url: code.to_url(base_url),
                    original_url: record.original_url.clone(),
                })
            })
            .collect())
    }

    async fn check_connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.sync(),
            None => Ok(()),
        }
    }

    fn backend(&self) -> Backend {
        if self.journal.is_some() {
            Backend::File
        } else {
            Backend::Memory
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_generator::{RandomGenerator, SeqGenerator};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const BASE: &str = "http://localhost:8080";

    fn storage() -> MemoryStorage<SeqGenerator> {
        MemoryStorage::new(SeqGenerator::with_prefix("sn"))
    }

    /// Replays a fixed list of codes, then repeats the last one.
    struct Scripted {
        codes: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl Scripted {
        fn new(codes: Vec<&'static str>) -> Self {
            Self {
                codes,
                next: AtomicUsize::new(0),
            }
        }
    }

    impl Generator for Scripted {
        fn generate(&self, _seed: &str) -> ShortCode {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            ShortCode::new_unchecked(self.codes[i.min(self.codes.len() - 1)])
        }
    }

    #[tokio::test]
    async fn save_and_get() {
        let storage = storage();

        let outcome = storage.save_url("https://example.com/a", "u1").await.unwrap();
        assert_eq!(outcome, SaveOutcome::Created(ShortCode::new_unchecked("sn000000")));

        let url = storage.get_url(outcome.code()).await.unwrap();
        assert_eq!(url, "https://example.com/a");
    }

    #[tokio::test]
    async fn repeated_save_returns_existing_code() {
        let storage = storage();

        let first = storage.save_url("https://example.com/a", "u1").await.unwrap();
        let second = storage.save_url("https://example.com/a", "u1").await.unwrap();

        assert!(!first.is_existing());
        assert!(second.is_existing());
        assert_eq!(first.code(), second.code());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn same_url_for_different_owners_gets_different_codes() {
        let storage = storage();

        let a = storage.save_url("https://example.com/a", "u1").await.unwrap();
        let b = storage.save_url("https://example.com/a", "u2").await.unwrap();
        let anon = storage.save_url("https://example.com/a", "").await.unwrap();

        assert!(!b.is_existing());
        assert!(!anon.is_existing());
        assert_ne!(a.code(), b.code());
        assert_ne!(a.code(), anon.code());
    }

    #[tokio::test]
    async fn get_unknown_code_is_not_found() {
        let storage = storage();

        let err = storage
            .get_url(&ShortCode::new_unchecked("nope"))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn empty_url_is_rejected() {
        let storage = storage();
        let err = storage.save_url("", "u1").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn collision_retries_with_a_new_code() {
        let storage = MemoryStorage::new(Scripted::new(vec!["K1", "K1", "K2"]));

        let first = storage.save_url("https://example.com/a", "").await.unwrap();
        let second = storage.save_url("https://example.com/b", "").await.unwrap();

        assert_eq!(first.code().as_str(), "K1");
        assert_eq!(second.code().as_str(), "K2");
        assert_eq!(storage.get_url(second.code()).await.unwrap(), "https://example.com/b");
    }

    #[tokio::test]
    async fn exhausted_collisions_fail_without_side_effects() {
        let storage = MemoryStorage::new(Scripted::new(vec!["K1"]));

        storage.save_url("https://example.com/a", "u1").await.unwrap();
        let err = storage.save_url("https://example.com/b", "u1").await.unwrap_err();

        assert_eq!(
            err,
            StorageError::CollisionExhausted {
                attempts: MAX_GENERATE_ATTEMPTS
            }
        );
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get_url(&ShortCode::new_unchecked("K1")).await.unwrap(), "https://example.com/a");
        assert_eq!(storage.get_user_urls(BASE, "u1").await.unwrap().len(), 1);

        // The failed pair was not reserved, so a retry mints again instead of deduplicating.
        let retry = storage.save_url("https://example.com/b", "u1").await.unwrap_err();
        assert!(matches!(retry, StorageError::CollisionExhausted { .. }));
    }

    #[tokio::test]
    async fn user_urls_are_scoped_to_owner() {
        let storage = storage();

        let a = storage.save_url("https://example.com/a", "u1").await.unwrap();
        let b = storage.save_url("https://example.com/b", "u1").await.unwrap();
        storage.save_url("https://example.com/c", "u2").await.unwrap();
        storage.save_url("https://example.com/d", "").await.unwrap();

        let urls = storage.get_user_urls(BASE, "u1").await.unwrap();
        assert_eq!(
            urls,
            vec![
                UserUrl {
                    short_url: a.code().to_url(BASE),
                    original_url: "https://example.com/a".to_string(),
                },
                UserUrl {
                    short_url: b.code().to_url(BASE),
                    original_url: "https://example.com/b".to_string(),
                },
            ]
        );

        assert!(storage.get_user_urls(BASE, "nobody").await.unwrap().is_empty());
        assert!(storage.get_user_urls(BASE, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_saves_every_new_entry() {
        let storage = storage();
        let entries: Vec<_> = (0..5)
            .map(|i| BatchEntry::new(format!("c{i}"), format!("https://example.com/{i}")))
            .collect();

        let report = storage.save_batch_url(BASE, &entries, "u1").await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.results.len(), 5);
        let ids: HashSet<_> = report.results.iter().map(|r| r.correlation_id.clone()).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(storage.get_user_urls(BASE, "u1").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn batch_entry_duplicating_a_stored_url_reuses_its_code() {
        let storage = storage();
        let existing = storage.save_url("https://example.com/1", "u1").await.unwrap();

        let entries: Vec<_> = (0..3)
            .map(|i| BatchEntry::new(format!("c{i}"), format!("https://example.com/{i}")))
            .collect();
        let report = storage.save_batch_url(BASE, &entries, "u1").await.unwrap();

        assert_eq!(report.results.len(), 3);
        let dup = report
            .results
            .iter()
            .find(|r| r.correlation_id == "c1")
            .unwrap();
        assert_eq!(dup.short_url, existing.code().to_url(BASE));
        assert_eq!(storage.len(), 3);
    }

    #[tokio::test]
    async fn batch_failure_is_isolated_to_its_entry() {
        let storage = MemoryStorage::new(Scripted::new(vec!["K1", "K2", "K2"]));
        let entries = vec![
            BatchEntry::new("a", "https://example.com/a"),
            BatchEntry::new("b", "https://example.com/b"),
            BatchEntry::new("c", "https://example.com/c"),
            BatchEntry::new("a", "https://example.com/again"),
            BatchEntry::new("d", ""),
        ];

        let report = storage.save_batch_url(BASE, &entries, "").await.unwrap();

        let ok: Vec<_> = report.results.iter().map(|r| r.correlation_id.as_str()).collect();
        assert_eq!(ok, vec!["a", "b"]);
        let failed: Vec<_> = report.failures.iter().map(|f| f.correlation_id.as_str()).collect();
        assert_eq!(failed, vec!["c", "a", "d"]);
        assert!(matches!(
            report.failures[0].error,
            StorageError::CollisionExhausted { .. }
        ));
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_saves_of_one_pair_yield_one_record() {
        let storage = Arc::new(MemoryStorage::new(RandomGenerator::new()));
        let mut handles = vec![];

        for _ in 0..32 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .save_url("https://example.com/hot", "u1")
                    .await
                    .unwrap()
            }));
        }

        let mut codes = HashSet::new();
        let mut created = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            if !outcome.is_existing() {
                created += 1;
            }
            codes.insert(outcome.into_code());
        }

        assert_eq!(created, 1);
        assert_eq!(codes.len(), 1);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_saves_of_distinct_urls_get_distinct_codes() {
        let storage = Arc::new(MemoryStorage::new(RandomGenerator::with_length(2)));
        let mut handles = vec![];

        for i in 0..64 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .save_url(&format!("https://example.com/{i}"), "u1")
                    .await
            }));
        }

        let mut codes = HashSet::new();
        for handle in handles {
            if let Ok(outcome) = handle.await.unwrap() {
                assert!(codes.insert(outcome.into_code()));
            }
        }
        assert_eq!(codes.len(), storage.len());
    }

    #[tokio::test]
    async fn journal_restores_every_issued_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        let mut issued = vec![];
        {
            let (storage, report) =
                MemoryStorage::open(RandomGenerator::new(), &path, true).unwrap();
            assert_eq!(report.loaded, 0);
            assert_eq!(storage.backend(), Backend::File);

            for i in 0..10 {
                let url = format!("https://example.com/{i}");
                let owner = if i % 2 == 0 { "u1" } else { "" };
                let outcome = storage.save_url(&url, owner).await.unwrap();
                issued.push((outcome.into_code(), url));
            }
            let batch = vec![BatchEntry::new("x", "https://example.com/batch")];
            storage.save_batch_url(BASE, &batch, "u2").await.unwrap();
            storage.close().await.unwrap();
        }

        let (restored, report) = MemoryStorage::open(RandomGenerator::new(), &path, true).unwrap();
        assert_eq!(report.loaded, 11);
        assert!(report.skipped.is_empty());

        for (code, url) in &issued {
            assert_eq!(&restored.get_url(code).await.unwrap(), url);
        }
        assert_eq!(restored.get_user_urls(BASE, "u1").await.unwrap().len(), 5);
        assert_eq!(restored.get_user_urls(BASE, "u2").await.unwrap().len(), 1);

        let again = restored.save_url("https://example.com/0", "u1").await.unwrap();
        assert!(again.is_existing());
        assert_eq!(again.code(), &issued[0].0);
    }

    #[tokio::test]
    async fn replay_skips_duplicate_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"short_url\":\"K1\",\"original_url\":\"https://a.example\",\"user_id\":\"u1\"}\n",
                "{\"short_url\":\"K1\",\"original_url\":\"https://b.example\",\"user_id\":\"u1\"}\n",
                "{\"short_url\":\"K2\",\"original_url\":\"https://a.example\",\"user_id\":\"u1\"}\n",
                "garbage\n",
                "{\"short_url\":\"K3\",\"original_url\":\"https://c.example\",\"user_id\":\"u1\"}\n",
            ),
        )
        .unwrap();

        let (storage, report) = MemoryStorage::open(SeqGenerator::with_prefix("sn"), &path, false).unwrap();

        assert_eq!(report.loaded, 2);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(skipped, vec![2, 3, 4]);
        assert_eq!(storage.get_url(&ShortCode::new_unchecked("K1")).await.unwrap(), "https://a.example");
        assert_eq!(storage.get_url(&ShortCode::new_unchecked("K3")).await.unwrap(), "https://c.example");
    }

    #[tokio::test]
    async fn plain_memory_reports_memory_backend() {
        let storage = storage();
        assert_eq!(storage.backend(), Backend::Memory);
        storage.check_connect().await.unwrap();
        storage.close().await.unwrap();
    }
}

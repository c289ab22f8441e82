//! Append-only journal mirroring the in-memory index to disk.
//!
//! Every record is written as one JSON object per line before the save that
//! created it is acknowledged. On startup the whole file is replayed to
//! rebuild the index. Lines that cannot be decoded are skipped and reported,
//! never fatal.

use jiff::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snip_core::{Result, ShortCode, StorageError, UrlRecord};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// On-disk shape of a journal line.
///
/// `shortURL` holds the bare code. Snake-case keys are accepted on read.
#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    #[serde(default)]
    uuid: String,
    #[serde(rename = "shortURL", alias = "short_url")]
    short_url: String,
    #[serde(rename = "originalURL", alias = "original_url")]
    original_url: String,
    #[serde(default, rename = "userID", alias = "user_id")]
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<Timestamp>,
}

impl JournalLine {
    fn from_record(record: &UrlRecord) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            short_url: record.code.to_string(),
            original_url: record.original_url.clone(),
            user_id: record.owner_id.clone(),
            created_at: Some(record.created_at),
        }
    }

    fn into_record(self) -> Result<UrlRecord> {
        let code = ShortCode::new(self.short_url)?;
        if self.original_url.is_empty() {
            return Err(StorageError::InvalidData("original url is empty".to_string()));
        }

        Ok(UrlRecord {
            code,
            original_url: self.original_url,
            owner_id: self.user_id,
            created_at: self.created_at.unwrap_or_else(Timestamp::now),
        })
    }
}

/// A journal line that was not restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the journal file.
    pub line: usize,
    pub reason: String,
}

/// Summary of a journal replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub path: PathBuf,
    pub loaded: usize,
    pub skipped: Vec<SkippedLine>,
}

/// Records decoded from a journal, in file order.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub(crate) records: Vec<(usize, UrlRecord)>,
    pub(crate) skipped: Vec<SkippedLine>,
}

#[derive(Debug)]
struct JournalFile {
    file: File,
    /// The file does not end with a newline, e.g. after a torn write.
    torn: bool,
}

/// Append-only JSON-lines file.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    inner: Mutex<JournalFile>,
    fsync: bool,
}

impl Journal {
    /// Opens the journal at `path`, creating it if missing, and decodes every line.
    ///
    /// With `fsync` set, each append is synced to disk before it returns.
    pub(crate) fn open(path: impl AsRef<Path>, fsync: bool) -> Result<(Self, Replay)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let (replay, torn) = Self::replay(&file)?;

        let journal = Self {
            path,
            inner: Mutex::new(JournalFile { file, torn }),
            fsync,
        };

        Ok((journal, replay))
    }

    fn replay(file: &File) -> Result<(Replay, bool)> {
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        let mut buf = Vec::new();
        let mut line = 0;
        let mut torn = false;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line += 1;
            torn = buf.last() != Some(&b'\n');

            let body = buf.trim_ascii();
            if body.is_empty() {
                continue;
            }

            let decoded = serde_json::from_slice::<JournalLine>(body)
                .map_err(|e| StorageError::InvalidData(e.to_string()))
                .and_then(JournalLine::into_record);

            match decoded {
                Ok(record) => replay.records.push((line, record)),
                Err(err) => replay.skipped.push(SkippedLine {
                    line,
                    reason: err.to_string(),
                }),
            }
        }

        Ok((replay, torn))
    }

    /// Appends `record` as a single line.
    ///
    /// Returns only after the full line was handed to the OS (and synced,
    /// if enabled). A failed write leaves the file marked torn so the next
    /// append starts on a fresh line.
    pub(crate) fn append(&self, record: &UrlRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&JournalLine::from_record(record))
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        line.push(b'\n');

        let mut inner = self.inner.lock();
        if inner.torn {
            inner.file.write_all(b"\n")?;
            inner.torn = false;
        }

        if let Err(err) = inner.file.write_all(&line) {
            inner.torn = true;
            return Err(err.into());
        }
        inner.file.flush()?;

        if self.fsync {
            inner.file.sync_data()?;
        }

        Ok(())
    }

    /// Flushes and syncs the file to disk.
    pub(crate) fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn record(code: &str, url: &str, owner: &str) -> UrlRecord {
        UrlRecord::new(ShortCode::new_unchecked(code), url, owner)
    }

    fn read(path: &Path) -> String {
        let mut content = String::new();
        File::open(path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        content
    }

    #[test]
    fn creates_missing_file_and_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("urls.jsonl");

        let (journal, replay) = Journal::open(&path, false).unwrap();

        assert!(path.exists());
        assert_eq!(journal.path(), path);
        assert!(replay.records.is_empty());
        assert!(replay.skipped.is_empty());
    }

    #[test]
    fn appended_records_replay_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        {
            let (journal, _) = Journal::open(&path, true).unwrap();
            journal.append(&record("K1", "https://example.com/a", "u1")).unwrap();
            journal.append(&record("K2", "https://example.com/b", "")).unwrap();
        }

        let (_, replay) = Journal::open(&path, false).unwrap();
        let records: Vec<_> = replay.records.into_iter().map(|(_, r)| r).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code.as_str(), "K1");
        assert_eq!(records[0].owner_id, "u1");
        assert_eq!(records[1].original_url, "https://example.com/b");
        assert!(records[1].is_anonymous());
    }

    #[test]
    fn lines_carry_the_documented_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");

        let (journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&record("K1", "https://example.com/a", "u1")).unwrap();

        let value: serde_json::Value = serde_json::from_str(read(&path).trim()).unwrap();
        assert!(value["uuid"].as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()));
        assert_eq!(value["shortURL"], "K1");
        assert_eq!(value["originalURL"], "https://example.com/a");
        assert_eq!(value["userID"], "u1");
        assert!(value.get("short_url").is_none());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"uuid\":\"1\",\"short_url\":\"K1\",\"original_url\":\"https://a.example\",\"user_id\":\"\"}\n",
                "not json at all\n",
                "\n",
                "{\"uuid\":\"3\",\"short_url\":\"bad code!\",\"original_url\":\"https://b.example\"}\n",
                "{\"shortURL\":\"K4\",\"originalURL\":\"https://c.example\",\"userID\":\"u9\",\"extra\":42}\n",
            ),
        )
        .unwrap();

        let (_, replay) = Journal::open(&path, false).unwrap();

        let codes: Vec<_> = replay
            .records
            .iter()
            .map(|(line, r)| (*line, r.code.to_string()))
            .collect();
        assert_eq!(codes, vec![(1, "K1".to_string()), (5, "K4".to_string())]);
        assert_eq!(replay.records[1].1.owner_id, "u9");

        let skipped: Vec<_> = replay.skipped.iter().map(|s| s.line).collect();
        assert_eq!(skipped, vec![2, 4]);
    }

    #[test]
    fn torn_tail_does_not_swallow_next_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.jsonl");
        std::fs::write(
            &path,
            "{\"short_url\":\"K1\",\"original_url\":\"https://a.example\"}\n{\"short_url\":\"K2\",\"orig",
        )
        .unwrap();

        {
            let (journal, replay) = Journal::open(&path, false).unwrap();
            assert_eq!(replay.records.len(), 1);
            assert_eq!(replay.skipped.len(), 1);
            journal.append(&record("K3", "https://c.example", "")).unwrap();
        }

        let (_, replay) = Journal::open(&path, false).unwrap();
        let codes: Vec<_> = replay.records.iter().map(|(_, r)| r.code.to_string()).collect();
        assert_eq!(codes, vec!["K1", "K3"]);
        assert_eq!(replay.skipped.len(), 1);
    }
}

//! Batch coordination shared by every backend.
//!
//! A batch is a list of independent entries. Each entry is saved on its own;
//! a failing entry is reported in [`BatchReport::failures`] and never undoes
//! entries that already succeeded.

use crate::error::StorageError;
use crate::record::SaveOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One URL to shorten as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub correlation_id: String,
    pub original_url: String,
}

impl BatchEntry {
    pub fn new(correlation_id: impl Into<String>, original_url: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_url: original_url.into(),
        }
    }
}

/// The short URL issued for one batch entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_url: String,
}

/// A batch entry that could not be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub correlation_id: String,
    pub error: StorageError,
}

/// Per-entry outcome of a batch save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Accumulates entry outcomes into a [`BatchReport`].
///
/// Every correlation id gets at most one outcome: once an id has been
/// claimed, later entries carrying the same id are reported as failures.
#[derive(Debug)]
pub struct BatchCollector {
    base_url: String,
    seen: HashSet<String>,
    report: BatchReport,
}

impl BatchCollector {
    pub fn new(base_url: impl Into<String>, capacity: usize) -> Self {
        Self {
            base_url: base_url.into(),
            seen: HashSet::with_capacity(capacity),
            report: BatchReport {
                results: Vec::with_capacity(capacity),
                failures: Vec::new(),
            },
        }
    }

    /// Claims `entry` for processing.
    ///
    /// Returns `false` (and records a failure) when the entry repeats an
    /// already claimed correlation id or carries an empty URL; the caller
    /// must skip it.
    pub fn claim(&mut self, entry: &BatchEntry) -> bool {
        if !self.seen.insert(entry.correlation_id.clone()) {
            self.report.failures.push(BatchFailure {
                correlation_id: entry.correlation_id.clone(),
                error: StorageError::InvalidData(format!(
                    "duplicate correlation id '{}'",
                    entry.correlation_id
                )),
            });
            return false;
        }

        if entry.original_url.is_empty() {
            self.report.failures.push(BatchFailure {
                correlation_id: entry.correlation_id.clone(),
                error: StorageError::InvalidData("original url is empty".to_string()),
            });
            return false;
        }

        true
    }

    pub fn succeed(&mut self, correlation_id: impl Into<String>, outcome: &SaveOutcome) {
        self.report.results.push(BatchResult {
            correlation_id: correlation_id.into(),
            short_url: outcome.code().to_url(&self.base_url),
        });
    }

    pub fn fail(&mut self, correlation_id: impl Into<String>, error: StorageError) {
        self.report.failures.push(BatchFailure {
            correlation_id: correlation_id.into(),
            error,
        });
    }

    pub fn finish(self) -> BatchReport {
        self.report
    }
}

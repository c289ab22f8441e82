//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the record model, the storage contract shared by
//! every backend, and the batch coordinator used by bulk inserts.

pub mod batch;
pub mod error;
pub mod record;
pub mod shortcode;
pub mod storage;

pub use batch::{BatchCollector, BatchEntry, BatchFailure, BatchReport, BatchResult};
pub use error::{Result, StorageError};
pub use record::{SaveOutcome, UrlRecord, UserUrl, ANONYMOUS_OWNER};
pub use shortcode::ShortCode;
pub use storage::{require_url, Backend, Storage, MAX_GENERATE_ATTEMPTS};

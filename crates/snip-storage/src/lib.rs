//! Storage backends for snip.
//!
//! [`MemoryStorage`] keeps records in process memory, optionally mirrored to
//! an append-only [`journal`] file. [`PostgresStorage`] keeps them in
//! PostgreSQL. [`Store`] hides the choice from callers.

pub mod journal;
pub mod memory;
pub mod postgres;
pub mod store;

pub use journal::{ReplayReport, SkippedLine};
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use snip_core::{Backend, Storage, StorageError};
pub use store::{Opened, Store, StoreConfig};

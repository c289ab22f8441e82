//! Disposable infrastructure for integration tests.

mod error;
mod postgres;

pub use error::{Result, TestInfraError};
pub use postgres::{PostgresConfig, PostgresServer};

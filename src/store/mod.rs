//! # Store Backends
//!
//! A [`Backend`] executes one validated [`Statement`] at a time and returns
//! the affected rows as JSON records. The query layer never sees a
//! connection; each call checks one out for its own duration.
//!
//! - [`postgres::PgBackend`]: bounded `sqlx` pool over PostgreSQL
//! - [`memory::MemoryBackend`]: in-process tables for tests and local runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::query::statement::{Record, Statement};

pub use memory::MemoryBackend;
pub use postgres::PgBackend;

/// Result type for backend operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Backend failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Value rejected by the store for its column type
    #[error("{0}")]
    TypeMismatch(String),

    /// Any other statement failure, message verbatim
    #[error("{0}")]
    Execution(String),

    /// Could not obtain a connection
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Backend already closed
    #[error("Connection pool is closed")]
    Closed,
}

/// Executes compiled statements against a relational store
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute one statement, returning the rows it produced or affected
    async fn execute(&self, statement: &Statement) -> StoreResult<Vec<Record>>;

    /// Release all connections. Later calls fail with [`StoreError::Closed`].
    async fn close(&self);

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

//! Record Store
//!
//! Persistence interface for person records and its SQLite implementation.

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::records::{NewPerson, PersonRecord, RecordSummary};

/// Name of the single table holding person records.
pub const TABLE: &str = "persons";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another record already uses the same `identification_number`.
    #[error("{message}")]
    UniqueViolation { message: String },
    #[error("record {0} not found")]
    NotFound(i64),
    /// Any other persistence fault (I/O, connectivity, closed store).
    #[error("{0}")]
    Storage(String),
}

impl StoreError {
    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::UniqueViolation { .. } => "unique_violation",
            StoreError::NotFound(_) => "not_found",
            StoreError::Storage(_) => "storage",
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage interface for person records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record and return its assigned id. Unset required fields
    /// are bound as NULL and rejected by the table as `Storage`.
    async fn create(&self, record: NewPerson) -> StoreResult<i64>;
    /// Every stored record, in no particular order.
    async fn list_all(&self) -> StoreResult<Vec<PersonRecord>>;
    /// Case-insensitive substring match on given name or surname.
    async fn search(&self, substring: &str) -> StoreResult<Vec<RecordSummary>>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
    async fn count(&self) -> StoreResult<i64>;
    /// Round trip to the database without touching records.
    async fn ping(&self) -> StoreResult<()>;
    /// Release the underlying connection. Later calls fail with `Storage`.
    async fn close(&self) -> StoreResult<()>;
}

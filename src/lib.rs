//! Person Registry
//!
//! A small record-management backend:
//! - Person records with primary, delegate and permit fields
//! - Derived 16-character identification code computed on create
//! - SQLite persistence with create, list, name search and delete
//! - JSON HTTP surface (axum)

pub mod config;
pub mod records;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use config::{DatabaseTarget, RegistryConfig};
pub use records::{derive_code, PersonFields, PersonRecord, RecordSummary};
pub use server::{router, AppState};
pub use store::{RecordStore, SqliteRecordStore, StoreError};

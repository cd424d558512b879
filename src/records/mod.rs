//! Records Module
//!
//! The person record type, its column table and the derived-code computation.

pub mod derive;
pub mod schema;

pub use derive::{derive_code, CODE_LEN};
pub use schema::{
    FieldError, FieldSpec, NewPerson, PersonFields, PersonRecord, RecordSummary, FIELDS,
};

//! Person Record Schema
//!
//! One column table drives everything that touches a record's fields: the
//! table DDL, the INSERT/SELECT column lists, extraction from request bodies
//! and the JSON shape of stored records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::derive::derive_code;

/// Declaration of one stored text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Declared width. Documented in the DDL, not enforced.
    pub max_len: usize,
    /// Required columns have no default: `NOT NULL UNIQUE`, enforced by the store.
    pub required: bool,
    /// Value stored when an optional field is absent.
    pub default: &'static str,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("field '{0}' must be a string")]
    NotAString(&'static str),
}

macro_rules! person_fields {
    (@required required) => { true };
    (@required) => { false };
    ($( $(#[$meta:meta])* $name:ident : $max_len:literal $( => $req:ident )? ),+ $(,)?) => {
        /// Every text column of a person record, in table order.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct PersonFields {
            $( $(#[$meta])* pub $name: String, )+
        }

        /// Column table in storage order (`id` excluded).
        pub const FIELDS: &[FieldSpec] = &[
            $( FieldSpec {
                name: stringify!($name),
                max_len: $max_len,
                required: person_fields!(@required $($req)?),
                default: "",
            }, )+
        ];

        impl PersonFields {
            /// Read a column by name.
            pub fn get(&self, name: &str) -> Option<&str> {
                match name {
                    $( stringify!($name) => Some(self.$name.as_str()), )+
                    _ => None,
                }
            }

            /// Mutable access to a column by name.
            pub fn get_mut(&mut self, name: &str) -> Option<&mut String> {
                match name {
                    $( stringify!($name) => Some(&mut self.$name), )+
                    _ => None,
                }
            }

            /// Column values in [`FIELDS`] order.
            pub fn values(&self) -> Vec<&str> {
                vec![ $( self.$name.as_str(), )+ ]
            }
        }
    };
}

person_fields! {
    // Primary person
    given_name: 100,
    surname: 100,
    identification_number: 50 => required,
    address: 255,
    street_number: 10,
    city: 100,
    birth_city: 100,
    birth_date: 10,
    sex: 1,
    /// Computed on create, never read from input.
    derived_code: 16,
    document_type: 50,
    document_number: 50,
    document_issue_date: 10,
    document_issue_city: 100,
    email: 100,
    mobile: 20,

    // Delegate
    delegate_surname: 100,
    delegate_given_name: 100,
    delegate_address: 255,
    delegate_street_number: 10,
    delegate_city: 100,
    delegate_birth_city: 100,
    delegate_birth_date: 10,
    /// Stored as supplied.
    delegate_derived_code: 16,
    delegate_document_type: 50,
    delegate_document_number: 50,
    delegate_document_issue_date: 10,
    delegate_document_issue_city: 100,
    delegate_email: 100,
    delegate_mobile: 20,

    // Permit
    permit_number: 50,
    permit_issue_date: 10,
    permit_expiry_date: 10,
    permit_plate_1: 20,
    permit_plate_2: 20,
}

/// Column that is always computed rather than taken from a request.
pub const DERIVED_CODE: &str = "derived_code";

impl PersonFields {
    /// Fill `derived_code` from the record's own biographical fields.
    pub fn with_derived_code(mut self) -> Self {
        self.derived_code = derive_code(
            &self.given_name,
            &self.surname,
            &self.birth_date,
            &self.sex,
            &self.birth_city,
        )
        .unwrap_or_default();
        self
    }
}

/// A record about to be inserted.
///
/// Required fields the request did not supply are kept as unset and bound as
/// NULL, so the table's constraints decide whether the row is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPerson {
    pub fields: PersonFields,
    unset: Vec<&'static str>,
}

impl NewPerson {
    /// Build a record from an untyped request object.
    ///
    /// Absent or `null` optional fields take their declared default. Numbers and
    /// booleans are kept as their JSON text; arrays and objects are rejected.
    /// Unknown keys are ignored.
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, FieldError> {
        let mut record = NewPerson::default();

        for spec in FIELDS {
            if spec.name == DERIVED_CODE {
                continue;
            }

            let value = match body.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    record.unset.push(spec.name);
                    continue;
                }
                None | Some(Value::Null) => spec.default.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(_) => return Err(FieldError::NotAString(spec.name)),
            };

            if let Some(slot) = record.fields.get_mut(spec.name) {
                *slot = value;
            }
        }

        Ok(record)
    }

    pub fn with_derived_code(mut self) -> Self {
        self.fields = self.fields.with_derived_code();
        self
    }

    /// Required fields missing from the request.
    pub fn unset(&self) -> &[&'static str] {
        &self.unset
    }

    /// Values to bind in [`FIELDS`] order; `None` binds NULL.
    pub fn bind_values(&self) -> Vec<Option<&str>> {
        FIELDS
            .iter()
            .map(|spec| {
                if self.unset.contains(&spec.name) {
                    None
                } else {
                    self.fields.get(spec.name)
                }
            })
            .collect()
    }
}

impl From<PersonFields> for NewPerson {
    fn from(fields: PersonFields) -> Self {
        Self { fields, unset: Vec::new() }
    }
}

/// A stored record: the auto-assigned id plus every column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: i64,
    #[serde(flatten)]
    pub fields: PersonFields,
}

/// The partial view returned by a name search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: i64,
    pub given_name: String,
    pub surname: String,
    pub identification_number: String,
}

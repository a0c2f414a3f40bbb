//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per aggregate. All public functions are re-exported here.

mod collection;
mod document;
mod facility;
mod patient;
mod vector_chunk;

use uuid::Uuid;

use super::DatabaseError;

pub use collection::*;
pub use document::*;
pub use facility::*;
pub use patient::*;
pub use vector_chunk::*;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(format!("bad uuid '{value}': {e}")))
}

pub(crate) fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.as_deref().map(parse_uuid).transpose()
}

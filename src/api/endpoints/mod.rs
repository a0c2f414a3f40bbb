//! API endpoint handlers.
//!
//! Each handler opens its own connection through `CoreState::open_db` and
//! drops it before awaiting the AI backend.

pub mod analysis;
pub mod clinical;
pub mod coding;
pub mod discharge;
pub mod documents;
pub mod facilities;
pub mod patients;
pub mod query;
pub mod root;
pub mod summary;

use rusqlite::Connection;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::db::repository::{get_facility, get_patient_by_code};
use crate::models::{Facility, PatientIdentifier};

/// Look up a patient by code, optionally requiring it to belong to `facility_id`.
pub(crate) fn find_patient(
    conn: &Connection,
    patient_code: &str,
    facility_id: Option<&Uuid>,
) -> Result<PatientIdentifier, ApiError> {
    let not_found = || match facility_id {
        Some(id) => ApiError::NotFound(format!("Patient not found in facility {id}")),
        None => ApiError::NotFound("Patient not found".into()),
    };

    let patient = get_patient_by_code(conn, patient_code.trim())?.ok_or_else(not_found)?;
    match facility_id {
        Some(id) if patient.facility_id != *id => Err(not_found()),
        _ => Ok(patient),
    }
}

pub(crate) fn find_facility(conn: &Connection, facility_id: &Uuid) -> Result<Facility, ApiError> {
    get_facility(conn, facility_id)?.ok_or_else(|| ApiError::NotFound("Facility not found".into()))
}

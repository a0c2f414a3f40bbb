//! Facility and patient provisioning.
//!
//! A facility is only usable once its VectorDB and shared collection exist,
//! and a patient only once its dedicated collection exists. Each workflow
//! writes all of its rows in one transaction so a failure leaves nothing
//! behind.

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{
    count_facility_documents, count_facility_patients, count_patient_documents, delete_facility,
    delete_patient, find_facility_collection, get_facility, get_facility_by_external_id,
    get_patient_by_code, get_vector_db_for_facility, insert_collection, insert_facility,
    insert_patient, insert_vector_db,
};
use crate::db::{count_facilities, DatabaseError};
use crate::models::*;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for ProvisionError {
    fn from(err: rusqlite::Error) -> Self {
        ProvisionError::Database(DatabaseError::from(err))
    }
}

#[derive(Debug, Clone)]
pub struct FacilityInput {
    pub name: String,
    pub address: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedFacility {
    pub facility: Facility,
    pub vector_db: VectorDb,
    pub shared_collection: Collection,
}

#[derive(Debug, Clone, Default)]
pub struct PatientInput {
    pub patient_code: String,
    pub facility_id: Uuid,
    pub external_id: Option<String>,
    pub age_range: Option<String>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedPatient {
    pub patient: PatientIdentifier,
    pub collection: Collection,
}

fn duplicate_external_id(external_id: &str) -> ProvisionError {
    ProvisionError::Validation(format!("Facility with external_id '{external_id}' already exists"))
}

fn duplicate_patient_code(code: &str) -> ProvisionError {
    ProvisionError::Validation(format!("Patient identifier with code '{code}' already exists"))
}

/// Create a facility with its VectorDB and `Facility_Shared_Collection`.
pub fn provision_facility(
    conn: &mut Connection,
    input: &FacilityInput,
) -> Result<ProvisionedFacility, ProvisionError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ProvisionError::Validation("Facility name must not be empty".into()));
    }
    let external_id = input
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(ext) = external_id {
        if get_facility_by_external_id(conn, ext)?.is_some() {
            return Err(duplicate_external_id(ext));
        }
    }

    let ts = now();
    let facility = Facility {
        id: Uuid::new_v4(),
        name: name.to_string(),
        address: input.address.clone(),
        external_id: external_id.map(str::to_string),
        created_at: ts,
        updated_at: ts,
    };
    let vector_db = VectorDb {
        id: Uuid::new_v4(),
        name: vector_db_name(name),
        facility_id: facility.id,
        created_at: ts,
    };
    let shared_collection = Collection {
        id: Uuid::new_v4(),
        name: FACILITY_SHARED_COLLECTION.to_string(),
        description: Some(format!("Shared collection for all patient documents at {name}")),
        vector_db_id: vector_db.id,
        created_at: ts,
    };

    let tx = conn.transaction()?;
    // A concurrent insert can slip past the existence check; the UNIQUE index catches it.
    insert_facility(&tx, &facility).map_err(|e| match external_id {
        Some(ext) if e.is_constraint_violation() => duplicate_external_id(ext),
        _ => ProvisionError::Database(e),
    })?;
    insert_vector_db(&tx, &vector_db)?;
    insert_collection(&tx, &shared_collection)?;
    tx.commit()?;

    tracing::info!(
        facility_id = %facility.id,
        vector_db_id = %vector_db.id,
        collection_id = %shared_collection.id,
        "Provisioned facility"
    );

    Ok(ProvisionedFacility {
        facility,
        vector_db,
        shared_collection,
    })
}

/// Create an anonymized patient and its `Patient_{code}_Collection`.
pub fn provision_patient(
    conn: &mut Connection,
    input: &PatientInput,
) -> Result<ProvisionedPatient, ProvisionError> {
    let code = input.patient_code.trim();
    if code.is_empty() {
        return Err(ProvisionError::Validation("patient_code must not be empty".into()));
    }
    if let Some(range) = &input.age_range {
        validate_age_range(range).map_err(ProvisionError::Validation)?;
    }

    if get_facility(conn, &input.facility_id)?.is_none() {
        return Err(ProvisionError::Validation(format!(
            "Facility {} not found",
            input.facility_id
        )));
    }
    let vector_db = get_vector_db_for_facility(conn, &input.facility_id)?.ok_or_else(|| {
        ProvisionError::Validation(format!("VectorDB not found for facility {}", input.facility_id))
    })?;
    if get_patient_by_code(conn, code)?.is_some() {
        return Err(duplicate_patient_code(code));
    }

    let ts = now();
    let patient = PatientIdentifier {
        id: Uuid::new_v4(),
        patient_code: code.to_string(),
        external_id: input.external_id.clone(),
        facility_id: input.facility_id,
        age_range: input.age_range.clone(),
        gender: input.gender,
        created_at: ts,
        updated_at: ts,
    };
    let collection = Collection {
        id: Uuid::new_v4(),
        name: patient_collection_name(code),
        description: Some(format!("Dedicated collection for patient {code}")),
        vector_db_id: vector_db.id,
        created_at: ts,
    };

    let tx = conn.transaction()?;
    insert_patient(&tx, &patient).map_err(|e| {
        if e.is_constraint_violation() {
            duplicate_patient_code(code)
        } else {
            ProvisionError::Database(e)
        }
    })?;
    insert_collection(&tx, &collection)?;
    tx.commit()?;

    tracing::info!(
        patient_id = %patient.id,
        facility_id = %patient.facility_id,
        collection_id = %collection.id,
        "Provisioned patient"
    );

    Ok(ProvisionedPatient {
        patient,
        collection,
    })
}

/// Remove a patient and its dedicated collection. Refused while documents
/// still reference the patient.
pub fn remove_patient(conn: &mut Connection, patient_code: &str) -> Result<(), ProvisionError> {
    let patient = get_patient_by_code(conn, patient_code)?
        .ok_or_else(|| ProvisionError::NotFound("Patient identifier not found".into()))?;

    let documents = count_patient_documents(conn, &patient.id)?;
    if documents > 0 {
        return Err(ProvisionError::Validation(format!(
            "Patient {patient_code} still has {documents} document(s); delete them first"
        )));
    }

    let tx = conn.transaction()?;
    if let Some(collection) =
        find_facility_collection(&tx, &patient.facility_id, &patient_collection_name(patient_code))?
    {
        crate::db::repository::delete_collection(&tx, &collection.id)?;
    }
    delete_patient(&tx, &patient.id)?;
    tx.commit()?;

    tracing::info!(patient_id = %patient.id, "Removed patient");
    Ok(())
}

/// Remove a facility with its VectorDB and collections. Refused while
/// patients or documents still belong to it.
pub fn remove_facility(conn: &mut Connection, facility_id: &Uuid) -> Result<(), ProvisionError> {
    if get_facility(conn, facility_id)?.is_none() {
        return Err(ProvisionError::NotFound("Facility not found".into()));
    }

    let patients = count_facility_patients(conn, facility_id)?;
    let documents = count_facility_documents(conn, facility_id)?;
    if patients > 0 || documents > 0 {
        return Err(ProvisionError::Validation(format!(
            "Facility still has {patients} patient(s) and {documents} document(s)"
        )));
    }

    // VectorDB and collections cascade.
    delete_facility(conn, facility_id)?;
    tracing::info!(facility_id = %facility_id, "Removed facility");
    Ok(())
}

const SAMPLE_FACILITIES: [(&str, &str); 3] = [
    ("General Hospital", "123 Main St, Medical City, MC 12345"),
    ("City Medical Center", "456 Health Ave, Medical City, MC 12346"),
    ("Regional Healthcare", "789 Care Blvd, Medical City, MC 12347"),
];

/// Provision the sample facilities on an empty database.
/// Returns nothing when any facility already exists.
pub fn seed_facilities(conn: &mut Connection) -> Result<Vec<ProvisionedFacility>, ProvisionError> {
    let existing = count_facilities(conn)?;
    if existing > 0 {
        tracing::info!(existing, "Facilities already present, skipping seed");
        return Ok(Vec::new());
    }

    SAMPLE_FACILITIES
        .iter()
        .map(|(name, address)| {
            provision_facility(
                conn,
                &FacilityInput {
                    name: (*name).to_string(),
                    address: Some((*address).to_string()),
                    external_id: None,
                },
            )
        })
        .collect()
}

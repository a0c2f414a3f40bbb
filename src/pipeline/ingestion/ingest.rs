use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;
use uuid::Uuid;

use super::IngestError;
use crate::db::repository::{
    delete_document, find_facility_collection, get_document, get_facility, get_patient,
    get_patient_by_code, insert_document,
};
use crate::models::*;
use crate::pipeline::import::{
    compute_content_hash, extract_text, remove_staged, sanitize_filename, stage_upload,
    validate_upload, DOCUMENT_UPLOADS,
};

/// A document submitted as JSON text.
#[derive(Debug, Clone)]
pub struct InlineDocumentInput {
    pub content: String,
    pub patient_identifier_id: Uuid,
    pub document_type: DocumentType,
    pub document_category: Option<String>,
    pub sensitivity_level: SensitivityLevel,
    pub metadata: BTreeMap<String, String>,
}

/// A document submitted as a multipart file.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub filename: String,
    pub declared_type: Option<String>,
    pub bytes: Vec<u8>,
    pub document_type: DocumentType,
    pub facility_id: Uuid,
    /// Targets the patient's collection; otherwise the facility shared collection.
    pub patient_code: Option<String>,
    pub document_category: Option<String>,
    pub sensitivity_level: SensitivityLevel,
    pub metadata: BTreeMap<String, String>,
}

/// The patient's dedicated collection, looked up by name through its facility.
fn patient_collection(
    conn: &Connection,
    patient: &PatientIdentifier,
) -> Result<Collection, IngestError> {
    let name = patient_collection_name(&patient.patient_code);
    find_facility_collection(conn, &patient.facility_id, &name)?.ok_or_else(|| {
        IngestError::Validation(format!(
            "Collection not found for patient {}",
            patient.patient_code
        ))
    })
}

/// Persist an inline clinical document as `pending`.
///
/// The document is always stored in the patient's own collection.
pub fn ingest_inline(conn: &Connection, input: &InlineDocumentInput) -> Result<Document, IngestError> {
    if input.content.trim().is_empty() {
        return Err(IngestError::Validation("Document content must not be empty".into()));
    }

    let patient = get_patient(conn, &input.patient_identifier_id)?
        .ok_or_else(|| IngestError::NotFound("Patient identifier not found".into()))?;
    let collection = patient_collection(conn, &patient)?;

    let ts = now();
    let doc = Document {
        id: Uuid::new_v4(),
        content_hash: Some(compute_content_hash(input.content.as_bytes())),
        source: DocumentSource::Inline {
            content: input.content.clone(),
        },
        document_type: input.document_type,
        document_category: input.document_category.clone(),
        sensitivity_level: input.sensitivity_level,
        facility_id: patient.facility_id,
        patient_identifier_id: Some(patient.id),
        collection_id: collection.id,
        metadata: input.metadata.clone(),
        index: IndexState::pending(),
        created_at: ts,
        updated_at: ts,
    };
    insert_document(conn, &doc)?;

    tracing::info!(
        document_id = %doc.id,
        patient_code = %patient.patient_code,
        document_type = %doc.document_type,
        "Document stored"
    );
    Ok(doc)
}

/// Validate, stage and persist an uploaded file.
///
/// Text formats are extracted and left `pending` for indexing. Binary formats
/// are stored as `skipped`. The staged file is removed if the row cannot be
/// written.
pub fn ingest_upload(
    conn: &Connection,
    upload_dir: &Path,
    max_file_size: u64,
    input: &UploadInput,
) -> Result<Document, IngestError> {
    let format = validate_upload(
        &input.filename,
        input.declared_type.as_deref(),
        input.bytes.len() as u64,
        max_file_size,
        &DOCUMENT_UPLOADS,
    )?;

    let facility = get_facility(conn, &input.facility_id)?
        .ok_or_else(|| IngestError::NotFound("Facility not found".into()))?;

    let (patient_id, collection) = match input.patient_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => {
            let patient = get_patient_by_code(conn, code)?
                .ok_or_else(|| IngestError::NotFound("Patient identifier not found".into()))?;
            if patient.facility_id != facility.id {
                return Err(IngestError::Validation(format!(
                    "Patient {code} does not belong to facility {}",
                    facility.id
                )));
            }
            let collection = patient_collection(conn, &patient)?;
            (Some(patient.id), collection)
        }
        None => {
            let collection = find_facility_collection(conn, &facility.id, FACILITY_SHARED_COLLECTION)?
                .ok_or_else(|| {
                    IngestError::Validation(format!(
                        "Shared collection not found for facility {}",
                        facility.id
                    ))
                })?;
            (None, collection)
        }
    };

    let staged = stage_upload(upload_dir, &input.bytes, &format.extension)?;
    let text = extract_text(&input.bytes, format.category);

    let mut index = IndexState::pending();
    if text.is_none() {
        index.status = IndexStatus::Skipped;
        index.error = Some(format!("Text extraction is not supported for {} files", format.category.as_str()));
    }

    let ts = now();
    let doc = Document {
        id: Uuid::new_v4(),
        content_hash: Some(compute_content_hash(&input.bytes)),
        source: DocumentSource::File {
            filename: sanitize_filename(&input.filename),
            content_type: format.mime_type.clone(),
            file_path: staged.to_string_lossy().into_owned(),
            file_size: input.bytes.len() as u64,
            text,
        },
        document_type: input.document_type,
        document_category: input.document_category.clone(),
        sensitivity_level: input.sensitivity_level,
        facility_id: facility.id,
        patient_identifier_id: patient_id,
        collection_id: collection.id,
        metadata: input.metadata.clone(),
        index,
        created_at: ts,
        updated_at: ts,
    };

    if let Err(e) = insert_document(conn, &doc) {
        remove_staged(&staged);
        return Err(e.into());
    }

    tracing::info!(
        document_id = %doc.id,
        facility_id = %facility.id,
        mime_type = %format.mime_type,
        size = input.bytes.len(),
        "Upload stored"
    );
    Ok(doc)
}

/// Hard-delete a document. Its vector chunks cascade; a staged file is
/// removed best-effort.
pub fn remove_document(conn: &Connection, document_id: &Uuid) -> Result<(), IngestError> {
    let doc = get_document(conn, document_id)?
        .ok_or_else(|| IngestError::NotFound("Document not found".into()))?;

    delete_document(conn, document_id)?;

    if let DocumentSource::File { file_path, .. } = &doc.source {
        remove_staged(Path::new(file_path));
    }
    tracing::info!(document_id = %document_id, "Document deleted");
    Ok(())
}

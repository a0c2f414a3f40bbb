//! Medical document endpoints.
//!
//! - `POST   /api/v1/medical-documents`             (inline JSON, then index)
//! - `POST   /api/v1/medical-documents/upload`      (multipart, then index)
//! - `GET    /api/v1/medical-documents`             (filters)
//! - `GET    /api/v1/medical-documents/:id`
//! - `POST   /api/v1/medical-documents/:id/process` (re-run indexing)
//! - `DELETE /api/v1/medical-documents/:id`
//!
//! Indexing failures never fail the request. The returned document carries
//! `processed`, `index_status` and `index_error` so callers can tell a saved
//! but unsearchable document apart.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::find_patient;
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::core_state::{CoreError, CoreState};
use crate::db::repository::{get_document, list_documents};
use crate::models::*;
use crate::pipeline::ingestion::{
    defer_index, index_document, ingest_inline, ingest_upload, reprocess_document, remove_document,
    InlineDocumentInput, UploadInput,
};

// ═══════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════

/// A document as returned to clients. Content and extracted text are never included.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<u64>,
    pub content_hash: Option<String>,
    pub document_type: DocumentType,
    pub document_category: Option<String>,
    pub sensitivity_level: SensitivityLevel,
    pub facility_id: Uuid,
    pub patient_identifier_id: Option<Uuid>,
    pub collection_id: Uuid,
    pub metadata: BTreeMap<String, String>,
    pub processed: bool,
    pub index_status: IndexStatus,
    pub index_error: Option<String>,
    pub index_attempts: u32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        let processed = doc.processed();
        let source_kind = doc.source.kind();
        let (filename, content_type, file_size) = match doc.source {
            DocumentSource::File {
                filename,
                content_type,
                file_size,
                ..
            } => (Some(filename), Some(content_type), Some(file_size)),
            DocumentSource::Inline { .. } => (None, None, None),
        };
        Self {
            id: doc.id,
            source_kind,
            filename,
            content_type,
            file_size,
            content_hash: doc.content_hash,
            document_type: doc.document_type,
            document_category: doc.document_category,
            sensitivity_level: doc.sensitivity_level,
            facility_id: doc.facility_id,
            patient_identifier_id: doc.patient_identifier_id,
            collection_id: doc.collection_id,
            metadata: doc.metadata,
            processed,
            index_status: doc.index.status,
            index_error: doc.index.error,
            index_attempts: doc.index.attempts,
            next_retry_at: doc.index.next_retry_at,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MedicalDocumentCreate {
    pub content: String,
    pub patient_identifier_id: Uuid,
    pub document_type: DocumentType,
    #[serde(default)]
    pub document_category: Option<String>,
    #[serde(default)]
    pub sensitivity_level: SensitivityLevel,
    /// Flat string map; other JSON shapes are rejected.
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub facility_id: Option<Uuid>,
    pub patient_code: Option<String>,
    pub document_type: Option<DocumentType>,
    pub processed: Option<bool>,
    pub index_status: Option<IndexStatus>,
    pub limit: Option<usize>,
}

// ═══════════════════════════════════════════════════════════
// Indexing
// ═══════════════════════════════════════════════════════════

/// Index a freshly stored document, or record why it could not be.
async fn index_stored(core: &CoreState, document: Document) -> Result<Document, ApiError> {
    if document.index.status != IndexStatus::Pending {
        return Ok(document);
    }
    match core.rag() {
        Ok(engine) => {
            Ok(index_document(&engine, core.db_path(), &document, &core.settings.index_retry).await?)
        }
        Err(CoreError::AiUnavailable(reason)) => Ok(defer_index(core.db_path(), &document, &reason)?),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════

pub async fn create(
    State(ctx): State<ApiContext>,
    payload: Result<Json<MedicalDocumentCreate>, JsonRejection>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let Json(req) = payload?;
    let input = InlineDocumentInput {
        content: req.content,
        patient_identifier_id: req.patient_identifier_id,
        document_type: req.document_type,
        document_category: req.document_category,
        sensitivity_level: req.sensitivity_level,
        metadata: req.metadata.unwrap_or_default(),
    };

    let stored = {
        let conn = ctx.core.open_db()?;
        ingest_inline(&conn, &input)?
    };
    let document = index_stored(&ctx.core, stored).await?;
    Ok(Json(document.into()))
}

/// Multipart fields: `file`, `document_type`, `facility_id`, optional
/// `patient_code`, `metadata` (JSON object), `document_category`,
/// `sensitivity_level`.
pub async fn upload(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>, ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut document_type: Option<DocumentType> = None;
    let mut facility_id: Option<Uuid> = None;
    let mut patient_code: Option<String> = None;
    let mut document_category: Option<String> = None;
    let mut sensitivity_level = SensitivityLevel::default();
    let mut metadata = BTreeMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            "document_type" => {
                let raw = field.text().await?;
                document_type = Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| ApiError::BadRequest(format!("Invalid document_type '{raw}'")))?,
                );
            }
            "facility_id" => facility_id = Some(parse_id(&field.text().await?, "facility")?),
            "patient_code" => patient_code = Some(field.text().await?).filter(|c| !c.trim().is_empty()),
            "document_category" => {
                document_category = Some(field.text().await?).filter(|c| !c.trim().is_empty())
            }
            "sensitivity_level" => {
                let raw = field.text().await?;
                sensitivity_level = raw
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid sensitivity_level '{raw}'")))?;
            }
            "metadata" => {
                let raw = field.text().await?;
                match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                    Ok(parsed) => metadata = parsed,
                    Err(e) => tracing::warn!(error = %e, "Ignoring upload metadata that is not a JSON object of strings"),
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let (filename, declared_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".into()))?;
    let document_type =
        document_type.ok_or_else(|| ApiError::BadRequest("Missing 'document_type' field".into()))?;
    let facility_id = facility_id.ok_or_else(|| ApiError::BadRequest("Missing 'facility_id' field".into()))?;

    let input = UploadInput {
        filename,
        declared_type,
        bytes,
        document_type,
        facility_id,
        patient_code,
        document_category,
        sensitivity_level,
        metadata,
    };

    let settings = &ctx.core.settings;
    let stored = {
        let conn = ctx.core.open_db()?;
        ingest_upload(&conn, &settings.upload_dir, settings.max_file_size, &input)?
    };
    let document = index_stored(&ctx.core, stored).await?;
    Ok(Json(document.into()))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<DocumentListQuery>, QueryRejection>,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    let Query(q) = query?;
    let conn = ctx.core.open_db()?;

    let patient_identifier_id = match q.patient_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => Some(find_patient(&conn, code, q.facility_id.as_ref())?.id),
        None => None,
    };
    let filter = DocumentFilter {
        facility_id: q.facility_id,
        patient_identifier_id,
        document_type: q.document_type,
        index_status: q.index_status,
        processed: q.processed,
        created_after: None,
        limit: q.limit,
    };

    let documents = list_documents(&conn, &filter)?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let id = parse_id(&id, "document")?;
    let conn = ctx.core.open_db()?;
    get_document(&conn, &id)?
        .map(|d| Json(d.into()))
        .ok_or_else(|| ApiError::NotFound("Document not found".into()))
}

/// Re-run indexing now. Counts as an attempt.
pub async fn process(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let id = parse_id(&id, "document")?;
    {
        let conn = ctx.core.open_db()?;
        if get_document(&conn, &id)?.is_none() {
            return Err(ApiError::NotFound("Document not found".into()));
        }
    }

    let engine = ctx.core.rag()?;
    let document =
        reprocess_document(&engine, ctx.core.db_path(), &id, &ctx.core.settings.index_retry).await?;
    Ok(Json(document.into()))
}

pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "document")?;
    let conn = ctx.core.open_db()?;
    remove_document(&conn, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const DOCUMENT_COLUMNS: &str = "id, source_kind, content, filename, content_type, file_path, file_size,
    content_hash, document_type, document_category, sensitivity_level, facility_id,
    patient_identifier_id, collection_id, metadata, index_status, index_error, index_attempts,
    next_retry_at, created_at, updated_at";

struct DocumentRow {
    id: String,
    source_kind: String,
    content: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
    file_path: Option<String>,
    file_size: Option<i64>,
    content_hash: Option<String>,
    document_type: String,
    document_category: Option<String>,
    sensitivity_level: String,
    facility_id: String,
    patient_identifier_id: Option<String>,
    collection_id: String,
    metadata: String,
    index_status: String,
    index_error: Option<String>,
    index_attempts: i64,
    next_retry_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        source_kind: row.get(1)?,
        content: row.get(2)?,
        filename: row.get(3)?,
        content_type: row.get(4)?,
        file_path: row.get(5)?,
        file_size: row.get(6)?,
        content_hash: row.get(7)?,
        document_type: row.get(8)?,
        document_category: row.get(9)?,
        sensitivity_level: row.get(10)?,
        facility_id: row.get(11)?,
        patient_identifier_id: row.get(12)?,
        collection_id: row.get(13)?,
        metadata: row.get(14)?,
        index_status: row.get(15)?,
        index_error: row.get(16)?,
        index_attempts: row.get(17)?,
        next_retry_at: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    let source = match SourceKind::from_str(&row.source_kind)? {
        SourceKind::Inline => DocumentSource::Inline {
            content: row.content.unwrap_or_default(),
        },
        SourceKind::File => DocumentSource::File {
            filename: row.filename.unwrap_or_default(),
            content_type: row.content_type.unwrap_or_default(),
            file_path: row.file_path.unwrap_or_default(),
            file_size: row.file_size.unwrap_or(0).max(0) as u64,
            text: row.content,
        },
    };

    // Metadata is written by this module only; a corrupt blob degrades to empty.
    let metadata: BTreeMap<String, String> = serde_json::from_str(&row.metadata).unwrap_or_default();

    Ok(Document {
        id: parse_uuid(&row.id)?,
        source,
        content_hash: row.content_hash,
        document_type: DocumentType::from_str(&row.document_type)?,
        document_category: row.document_category,
        sensitivity_level: SensitivityLevel::from_str(&row.sensitivity_level)?,
        facility_id: parse_uuid(&row.facility_id)?,
        patient_identifier_id: parse_optional_uuid(row.patient_identifier_id)?,
        collection_id: parse_uuid(&row.collection_id)?,
        metadata,
        index: IndexState {
            status: IndexStatus::from_str(&row.index_status)?,
            error: row.index_error,
            attempts: row.index_attempts.max(0) as u32,
            next_retry_at: row.next_retry_at.as_deref().map(parse_timestamp),
        },
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

fn metadata_json(metadata: &BTreeMap<String, String>) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".into())
}

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    let (content, filename, content_type, file_path, file_size) = match &doc.source {
        DocumentSource::Inline { content } => (Some(content.as_str()), None, None, None, None),
        DocumentSource::File {
            filename,
            content_type,
            file_path,
            file_size,
            text,
        } => (
            text.as_deref(),
            Some(filename.as_str()),
            Some(content_type.as_str()),
            Some(file_path.as_str()),
            Some(*file_size as i64),
        ),
    };

    conn.execute(
        &format!(
            "INSERT INTO documents ({DOCUMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                     ?18, ?19, ?20, ?21)"
        ),
        params![
            doc.id.to_string(),
            doc.source.kind().as_str(),
            content,
            filename,
            content_type,
            file_path,
            file_size,
            doc.content_hash,
            doc.document_type.as_str(),
            doc.document_category,
            doc.sensitivity_level.as_str(),
            doc.facility_id.to_string(),
            doc.patient_identifier_id.map(|id| id.to_string()),
            doc.collection_id.to_string(),
            metadata_json(&doc.metadata),
            doc.index.status.as_str(),
            doc.index.error,
            doc.index.attempts as i64,
            doc.index.next_retry_at.as_ref().map(format_timestamp),
            format_timestamp(&doc.created_at),
            format_timestamp(&doc.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id.to_string()],
            read_document_row,
        )
        .optional()?;
    row.map(document_from_row).transpose()
}

/// List documents newest first.
pub fn list_documents(conn: &Connection, filter: &DocumentFilter) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE (?1 IS NULL OR facility_id = ?1)
           AND (?2 IS NULL OR patient_identifier_id = ?2)
           AND (?3 IS NULL OR document_type = ?3)
           AND (?4 IS NULL OR index_status = ?4)
           AND (?5 IS NULL OR (index_status = 'indexed') = ?5)
           AND (?6 IS NULL OR created_at >= ?6)
         ORDER BY created_at DESC, id
         LIMIT ?7"
    ))?;

    let rows = stmt.query_map(
        params![
            filter.facility_id.map(|id| id.to_string()),
            filter.patient_identifier_id.map(|id| id.to_string()),
            filter.document_type.map(|t| t.as_str()),
            filter.index_status.map(|s| s.as_str()),
            filter.processed,
            filter.created_after.as_ref().map(format_timestamp),
            filter.limit.map(|l| l as i64).unwrap_or(-1),
        ],
        read_document_row,
    )?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

/// Persist the outcome of an indexing attempt.
pub fn update_index_state(
    conn: &Connection,
    document_id: &Uuid,
    state: &IndexState,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET index_status = ?2, index_error = ?3, index_attempts = ?4,
         next_retry_at = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            document_id.to_string(),
            state.status.as_str(),
            state.error,
            state.attempts as i64,
            state.next_retry_at.as_ref().map(format_timestamp),
            format_timestamp(&now()),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

/// Failed documents whose backoff has elapsed and that still have attempts left.
pub fn documents_due_for_retry(
    conn: &Connection,
    at: &NaiveDateTime,
    max_attempts: u32,
    limit: usize,
) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE index_status = 'failed'
           AND index_attempts < ?1
           AND (next_retry_at IS NULL OR next_retry_at <= ?2)
         ORDER BY next_retry_at, created_at
         LIMIT ?3"
    ))?;

    let rows = stmt.query_map(
        params![max_attempts as i64, format_timestamp(at), limit as i64],
        read_document_row,
    )?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

/// Hard delete. Vector chunks cascade.
pub fn delete_document(conn: &Connection, document_id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM documents WHERE id = ?1",
        params![document_id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

pub fn count_patient_documents(conn: &Connection, patient_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE patient_identifier_id = ?1",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn count_facility_documents(conn: &Connection, facility_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM documents WHERE facility_id = ?1",
        params![facility_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Per-value document counts for a patient, grouped by `document_type` or `index_status`.
pub fn count_patient_documents_by(
    conn: &Connection,
    patient_id: &Uuid,
    column: DocumentCountColumn,
) -> Result<BTreeMap<String, i64>, DatabaseError> {
    let column = match column {
        DocumentCountColumn::DocumentType => "document_type",
        DocumentCountColumn::IndexStatus => "index_status",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM documents
         WHERE patient_identifier_id = ?1 GROUP BY {column}"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

#[derive(Debug, Clone, Copy)]
pub enum DocumentCountColumn {
    DocumentType,
    IndexStatus,
}

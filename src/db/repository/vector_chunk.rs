use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::{format_timestamp, now};

/// A stored chunk with its embedding, scoped to one collection.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub collection_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    pub section_title: Option<String>,
    pub embedding: Vec<f32>,
}

/// Little-endian f32 packing for the `embedding` BLOB column.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Replace every chunk of a document in one transaction.
pub fn replace_document_chunks(
    conn: &Connection,
    document_id: &Uuid,
    chunks: &[StoredChunk],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM vector_chunks WHERE document_id = ?1",
        params![document_id.to_string()],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO vector_chunks
             (id, document_id, collection_id, chunk_index, content, section_title, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let created_at = format_timestamp(&now());
        for chunk in chunks {
            stmt.execute(params![
                chunk.id.to_string(),
                chunk.document_id.to_string(),
                chunk.collection_id.to_string(),
                chunk.chunk_index as i64,
                chunk.content,
                chunk.section_title,
                encode_embedding(&chunk.embedding),
                created_at,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load chunks, optionally restricted to a set of collections.
pub fn load_chunks(
    conn: &Connection,
    collection_ids: Option<&[Uuid]>,
) -> Result<Vec<StoredChunk>, DatabaseError> {
    let sql = match collection_ids {
        Some(ids) if !ids.is_empty() => {
            let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            format!(
                "SELECT id, document_id, collection_id, chunk_index, content, section_title, embedding
                 FROM vector_chunks WHERE collection_id IN ({placeholders})"
            )
        }
        Some(_) => return Ok(Vec::new()),
        None => "SELECT id, document_id, collection_id, chunk_index, content, section_title, embedding
                 FROM vector_chunks"
            .to_string(),
    };

    let bound: Vec<String> = collection_ids
        .unwrap_or_default()
        .iter()
        .map(|id| id.to_string())
        .collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Vec<u8>>(6)?,
        ))
    })?;

    let mut chunks = Vec::new();
    for row in rows {
        let (id, document_id, collection_id, chunk_index, content, section_title, blob) = row?;
        chunks.push(StoredChunk {
            id: parse_uuid(&id)?,
            document_id: parse_uuid(&document_id)?,
            collection_id: parse_uuid(&collection_id)?,
            chunk_index: chunk_index.max(0) as usize,
            content,
            section_title,
            embedding: decode_embedding(&blob),
        });
    }
    Ok(chunks)
}

pub fn count_document_chunks(conn: &Connection, document_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM vector_chunks WHERE document_id = ?1",
        params![document_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

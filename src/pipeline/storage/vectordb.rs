use std::path::PathBuf;

use uuid::Uuid;

use super::types::{ScoredChunk, SearchScope, TextChunk, VectorStore};
use super::StorageError;
use crate::db::repository::{load_chunks, replace_document_chunks, StoredChunk};
use crate::db::sqlite::open_database;

/// Vector store persisted in the `vector_chunks` table.
///
/// Search is an exact cosine scan over the chunks of the scoped
/// collections. Each call opens its own connection.
pub struct SqliteVectorStore {
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl VectorStore for SqliteVectorStore {
    fn store_chunks(
        &self,
        document_id: &Uuid,
        collection_id: &Uuid,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StorageError> {
        if chunks.len() != embeddings.len() {
            return Err(StorageError::VectorDb(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let rows: Vec<StoredChunk> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredChunk {
                id: Uuid::new_v4(),
                document_id: *document_id,
                collection_id: *collection_id,
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                section_title: chunk.section_title.clone(),
                embedding: embedding.clone(),
            })
            .collect();

        let conn = open_database(&self.db_path)?;
        replace_document_chunks(&conn, document_id, &rows)?;

        tracing::debug!(document_id = %document_id, chunks = rows.len(), "Stored vector chunks");
        Ok(rows.len())
    }

    fn search(
        &self,
        query_embedding: &[f32],
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StorageError> {
        let conn = open_database(&self.db_path)?;
        let stored = match scope {
            SearchScope::All => load_chunks(&conn, None)?,
            SearchScope::Collections(ids) => load_chunks(&conn, Some(ids.as_slice()))?,
        };
        Ok(rank_chunks(query_embedding, stored, top_k))
    }
}

/// Score every chunk against the query and keep the best `top_k`.
pub fn rank_chunks(query: &[f32], chunks: Vec<StoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|c| ScoredChunk {
            score: cosine_similarity(query, &c.embedding),
            document_id: c.document_id,
            collection_id: c.collection_id,
            chunk_index: c.chunk_index,
            content: c.content,
            section_title: c.section_title,
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::StorageError;

/// A semantic chunk of a clinical document
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub content: String,
    pub chunk_index: usize,
    pub section_title: Option<String>,
    pub char_offset: usize,
}

/// Chunking strategy trait
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<TextChunk>;
}

/// Embedding model abstraction
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StorageError>;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| StorageError::Embedding("provider returned no vectors".into()))
    }
}

/// Which collections a search may read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchScope {
    All,
    Collections(Vec<Uuid>),
}

/// A retrieved chunk with its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub document_id: Uuid,
    pub collection_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    pub section_title: Option<String>,
    pub score: f32,
}

/// Vector store abstraction
pub trait VectorStore: Send + Sync {
    /// Replace all chunks of `document_id` with the given chunks and embeddings.
    fn store_chunks(
        &self,
        document_id: &Uuid,
        collection_id: &Uuid,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, StorageError>;

    fn search(
        &self,
        query_embedding: &[f32],
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StorageError>;
}

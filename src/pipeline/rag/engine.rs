use std::sync::Arc;

use uuid::Uuid;

use super::llm::LlmClient;
use super::prompt::build_query_prompt;
use super::types::{GenerationOptions, RagAnswer};
use super::RagError;
use crate::pipeline::storage::types::{Chunker, EmbeddingModel, SearchScope, VectorStore};
use crate::pipeline::storage::vectordb::SqliteVectorStore;
use crate::pipeline::storage::StorageError;

/// Retrieval-augmented query engine.
///
/// Owns the provider clients and the vector store. Built once at startup and
/// shared through `CoreState`; every method is safe to call concurrently.
pub struct RagEngine {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingModel>,
    store: SqliteVectorStore,
    chunker: Box<dyn Chunker>,
    system_prompt: String,
    default_top_k: usize,
}

impl RagEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingModel>,
        store: SqliteVectorStore,
        chunker: Box<dyn Chunker>,
        system_prompt: String,
        default_top_k: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            chunker,
            system_prompt,
            default_top_k: default_top_k.max(1),
        }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Chunk, embed and store a document's text under `collection_id`,
    /// replacing any chunks it had. Returns the number of chunks stored.
    pub async fn insert(&self, document_id: &Uuid, collection_id: &Uuid, text: &str) -> Result<usize, RagError> {
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            return Err(StorageError::EmptyChunks.into());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let stored = self
            .store
            .store_chunks(document_id, collection_id, &chunks, &embeddings)?;

        tracing::info!(document_id = %document_id, chunks = stored, "Document indexed");
        Ok(stored)
    }

    /// Retrieve the `top_k` closest chunks within `scope` and answer `query`
    /// against them.
    pub async fn query(
        &self,
        query: &str,
        scope: &SearchScope,
        top_k: Option<usize>,
        options: &GenerationOptions,
    ) -> Result<RagAnswer, RagError> {
        let top_k = top_k.unwrap_or(self.default_top_k).max(1);
        let embedding = self.embedder.embed(query).await?;
        let sources = self.store.search(&embedding, scope, top_k)?;

        tracing::debug!(sources = sources.len(), top_k, "Retrieved context");

        let prompt = build_query_prompt(query, &sources);
        let text = self.llm.complete(&self.system_prompt, &prompt, options).await?;

        Ok(RagAnswer { text, sources })
    }

    /// Plain completion with the configured system prompt, no retrieval.
    pub async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String, RagError> {
        self.llm.complete(&self.system_prompt, prompt, options).await
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::EmbeddingModel;
use super::StorageError;

/// Maximum inputs per `/embeddings` request.
const EMBED_BATCH_SIZE: usize = 64;

// ═══════════════════════════════════════════════════════════
// HTTP embedder: OpenAI-compatible `/embeddings`
// ═══════════════════════════════════════════════════════════

/// Embedding client for any provider exposing an OpenAI-style `/embeddings` route.
pub struct HttpEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        dimension: usize,
        timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::EmbeddingConnection(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimension,
            client,
            timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StorageError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&EmbeddingRequest {
                    model: &self.model,
                    input: batch,
                })
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        StorageError::EmbeddingConnection(format!(
                            "Request timed out after {}s",
                            self.timeout_secs
                        ))
                    } else {
                        StorageError::EmbeddingConnection(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::EmbeddingProvider {
                    status: status.as_u16(),
                    body,
                });
            }

            let mut parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| StorageError::Embedding(format!("Malformed response: {e}")))?;

            if parsed.data.len() != batch.len() {
                return Err(StorageError::Embedding(format!(
                    "Expected {} vectors, got {}",
                    batch.len(),
                    parsed.data.len()
                )));
            }
            parsed.data.sort_by_key(|d| d.index);

            for item in parsed.data {
                if item.embedding.len() != self.dimension {
                    return Err(StorageError::DimensionMismatch {
                        expected: self.dimension,
                        actual: item.embedding.len(),
                    });
                }
                vectors.push(item.embedding);
            }
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ═══════════════════════════════════════════════════════════
// Mock embedder (deterministic, offline)
// ═══════════════════════════════════════════════════════════

/// Hashed bag-of-words embedder. Texts sharing words land near each other,
/// which is enough for retrieval tests without a provider.
#[derive(Clone)]
pub struct MockEmbedder {
    dimension: usize,
    /// Calls left that fail with a connection error before succeeding.
    failures: Arc<AtomicUsize>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dimension(64)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `count` calls, then embed normally.
    pub fn failing_times(count: usize) -> Self {
        let embedder = Self::new();
        embedder.failures.store(count, Ordering::SeqCst);
        embedder
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StorageError> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::EmbeddingConnection("mock embedder offline".into()));
        }
        Ok(texts.iter().map(|t| hashed_vector(t, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hashed_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        // FNV-1a over the lowercased token
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        vec[(hash % dim as u64) as usize] += 1.0;
    }

    // L2 normalize
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::vectordb::cosine_similarity;

    #[tokio::test]
    async fn mock_embed_returns_correct_dimension() {
        let embedder = MockEmbedder::with_dimension(32);
        let vec = embedder.embed("Hello world").await.unwrap();
        assert_eq!(vec.len(), 32);
        assert_eq!(embedder.dimension(), 32);
    }

    #[tokio::test]
    async fn mock_failures_run_out() {
        let embedder = MockEmbedder::failing_times(1);
        assert!(matches!(
            embedder.embed("x").await,
            Err(StorageError::EmbeddingConnection(_))
        ));
        assert!(embedder.embed("x").await.is_ok());
    }

    #[tokio::test]
    async fn mock_embed_is_deterministic_and_normalized() {
        let embedder = MockEmbedder::new();
        let a = embedder.embed("Metformin 500mg").await.unwrap();
        let b = embedder.embed("metformin 500MG").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_score_higher() {
        let embedder = MockEmbedder::new();
        let query = embedder.embed("blood pressure reading").await.unwrap();
        let related = embedder.embed("Blood pressure 140/90 at last reading").await.unwrap();
        let unrelated = embedder.embed("Knee x-ray shows no fracture").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn empty_text_is_zero_vector() {
        let embedder = MockEmbedder::new();
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = MockEmbedder::new();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }
}

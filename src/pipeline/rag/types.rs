use serde::{Deserialize, Serialize};

use crate::pipeline::storage::types::ScoredChunk;

/// Sampling knobs forwarded to the provider. `None` keeps the provider default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Generated text plus the chunks it was grounded on, best first.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

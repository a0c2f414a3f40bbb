pub mod types;
pub mod llm;
pub mod prompt;
pub mod engine;

pub use engine::RagEngine;
pub use llm::{LlmClient, MockLlmClient, OpenAiClient};
pub use types::{GenerationOptions, RagAnswer};

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("LLM connection failed: {0}")]
    LlmConnection(String),

    #[error("LLM provider returned {status}: {body}")]
    LlmProvider { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub mod types;
pub mod chunker;
pub mod embedder;
pub mod vectordb;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Vector DB error: {0}")]
    VectorDb(String),

    #[error("Embedding request failed: {0}")]
    EmbeddingConnection(String),

    #[error("Embedding provider returned {status}: {body}")]
    EmbeddingProvider { status: u16, body: String },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Chunking produced no results")]
    EmptyChunks,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(DatabaseError::from(err))
    }
}

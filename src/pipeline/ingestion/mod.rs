//! Document ingestion: persist a document against the right collection, then
//! forward its text to the vector index and record the outcome.
//!
//! Indexing is a side effect that never fails the ingest itself. A failed
//! attempt leaves the row saved with `index_status = failed` and a
//! `next_retry_at`, which the retry worker picks up.

pub mod ingest;
pub mod indexer;
pub mod retry;

pub use indexer::*;
pub use ingest::*;
pub use retry::*;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::import::ImportError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

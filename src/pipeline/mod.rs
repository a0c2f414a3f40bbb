pub mod import;
pub mod storage;
pub mod rag;
pub mod ingestion; // Persist documents, index them, retry failures
pub mod insights; // Structured fields from model answers

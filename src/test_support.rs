//! Fixtures shared by unit tests across modules.

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::Connection;
use uuid::Uuid;

use crate::config::Settings;
use crate::core_state::CoreState;
use crate::db::repository::insert_document;
use crate::models::*;
use crate::pipeline::rag::{MockLlmClient, RagEngine};
use crate::pipeline::storage::chunker::ClinicalChunker;
use crate::pipeline::storage::embedder::MockEmbedder;
use crate::pipeline::storage::vectordb::SqliteVectorStore;

/// Store a pending inline clinical note for `patient` and return its id.
pub fn insert_inline_document(
    conn: &Connection,
    patient: &PatientIdentifier,
    collection_id: Uuid,
    content: &str,
) -> Uuid {
    let ts = now();
    let doc = Document {
        id: Uuid::new_v4(),
        source: DocumentSource::Inline {
            content: content.to_string(),
        },
        content_hash: None,
        document_type: DocumentType::ClinicalNote,
        document_category: None,
        sensitivity_level: SensitivityLevel::Standard,
        facility_id: patient.facility_id,
        patient_identifier_id: Some(patient.id),
        collection_id,
        metadata: BTreeMap::new(),
        index: IndexState::pending(),
        created_at: ts,
        updated_at: ts,
    };
    insert_document(conn, &doc).unwrap();
    doc.id
}

/// Engine over the settings' database with a mock LLM and embedder.
pub fn mock_engine(settings: &Settings, llm: MockLlmClient) -> Arc<RagEngine> {
    mock_engine_with(settings, llm, MockEmbedder::new())
}

pub fn mock_engine_with(settings: &Settings, llm: MockLlmClient, embedder: MockEmbedder) -> Arc<RagEngine> {
    Arc::new(RagEngine::new(
        Arc::new(llm),
        Arc::new(embedder),
        SqliteVectorStore::new(&settings.database_path),
        Box::new(ClinicalChunker::new()),
        settings.ai_system_prompt.clone(),
        settings.similarity_top_k,
    ))
}

/// Core state rooted in a temp directory with the AI backend ready.
/// Keep the returned `TempDir` alive for the duration of the test.
pub fn ready_core(llm: MockLlmClient) -> (tempfile::TempDir, Arc<CoreState>) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::with_data_dir(dir.path()).unwrap();
    let engine = mock_engine(&settings, llm);
    let core = Arc::new(CoreState::new(settings));
    core.set_ai_ready(engine);
    (dir, core)
}

/// Core state rooted in a temp directory with the AI backend uninitialized.
pub fn offline_core() -> (tempfile::TempDir, Arc<CoreState>) {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::with_data_dir(dir.path()).unwrap();
    (dir, Arc::new(CoreState::new(settings)))
}

//! Shared application state.
//!
//! `CoreState` is built once at startup, wrapped in `Arc`, and handed to the
//! router and the index retry worker. The AI backend is an explicit state
//! machine: handlers that need it get a 503 until it is `Ready`.

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::config::Settings;
use crate::db;
use crate::pipeline::rag::{OpenAiClient, RagEngine};
use crate::pipeline::storage::chunker::ClinicalChunker;
use crate::pipeline::storage::embedder::HttpEmbedder;
use crate::pipeline::storage::vectordb::SqliteVectorStore;

/// Lifecycle of the AI query service.
pub enum AiState {
    /// Not usable. Holds the reason shown to callers and health checks.
    Uninitialized(String),
    Ready(Arc<RagEngine>),
}

pub struct CoreState {
    pub settings: Settings,
    ai: RwLock<AiState>,
}

impl CoreState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ai: RwLock::new(AiState::Uninitialized("AI service has not been initialized".into())),
        }
    }

    // ── Database ────────────────────────────────────────────

    /// Open a fresh connection for one request. Dropped when the caller is done.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.settings.database_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.settings.database_path
    }

    /// Create the database and staging directories.
    pub fn ensure_directories(&self) -> Result<(), CoreError> {
        for dir in [
            &self.settings.data_dir,
            &self.settings.upload_dir,
            &self.settings.processed_dir,
            &self.settings.temp_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    // ── AI service ──────────────────────────────────────────

    /// The engine, or `AiUnavailable` while uninitialized.
    pub fn rag(&self) -> Result<Arc<RagEngine>, CoreError> {
        let guard = self.ai.read().map_err(|_| CoreError::LockPoisoned)?;
        match &*guard {
            AiState::Ready(engine) => Ok(Arc::clone(engine)),
            AiState::Uninitialized(reason) => Err(CoreError::AiUnavailable(reason.clone())),
        }
    }

    /// `None` when ready, otherwise the reason it is not.
    pub fn ai_unavailable_reason(&self) -> Option<String> {
        match self.ai.read() {
            Ok(guard) => match &*guard {
                AiState::Ready(_) => None,
                AiState::Uninitialized(reason) => Some(reason.clone()),
            },
            Err(_) => Some("AI state lock poisoned".into()),
        }
    }

    pub fn ai_ready(&self) -> bool {
        self.ai_unavailable_reason().is_none()
    }

    pub fn set_ai_ready(&self, engine: Arc<RagEngine>) {
        if let Ok(mut guard) = self.ai.write() {
            *guard = AiState::Ready(engine);
        }
    }

    pub fn set_ai_unavailable(&self, reason: impl Into<String>) {
        if let Ok(mut guard) = self.ai.write() {
            *guard = AiState::Uninitialized(reason.into());
        }
    }

    /// Build the provider clients from settings and move to `Ready`.
    ///
    /// A missing API key or a client construction failure leaves the state
    /// `Uninitialized` with the reason; the service keeps serving CRUD routes.
    pub fn initialize_ai(&self) -> bool {
        let settings = &self.settings;
        let Some(api_key) = settings.llm_api_key.as_deref() else {
            tracing::warn!("LLM_API_KEY is not set, AI endpoints disabled");
            self.set_ai_unavailable("LLM_API_KEY is not configured");
            return false;
        };

        let clients = OpenAiClient::new(
            &settings.llm_base_url,
            api_key,
            &settings.llm_model,
            settings.llm_timeout_secs,
        )
        .map_err(|e| e.to_string())
        .and_then(|llm| {
            HttpEmbedder::new(
                &settings.llm_base_url,
                api_key,
                &settings.embedding_model,
                settings.vector_dimension,
                settings.llm_timeout_secs,
            )
            .map(|embedder| (llm, embedder))
            .map_err(|e| e.to_string())
        });

        match clients {
            Ok((llm, embedder)) => {
                let engine = RagEngine::new(
                    Arc::new(llm),
                    Arc::new(embedder),
                    SqliteVectorStore::new(&settings.database_path),
                    Box::new(ClinicalChunker::new()),
                    settings.ai_system_prompt.clone(),
                    settings.similarity_top_k,
                );
                self.set_ai_ready(Arc::new(engine));
                tracing::info!(
                    model = %settings.llm_model,
                    embedding_model = %settings.embedding_model,
                    "AI service initialized"
                );
                true
            }
            Err(reason) => {
                tracing::error!(error = %reason, "Failed to initialize AI service");
                self.set_ai_unavailable(format!("AI service initialization failed: {reason}"));
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::MockLlmClient;
    use crate::test_support::{mock_engine, offline_core};

    #[test]
    fn new_state_is_uninitialized() {
        let (_dir, core) = offline_core();
        assert!(!core.ai_ready());
        assert!(matches!(core.rag(), Err(CoreError::AiUnavailable(_))));
    }

    #[test]
    fn initialize_without_key_stays_unavailable() {
        let (_dir, core) = offline_core();
        assert!(!core.initialize_ai());
        let reason = core.ai_unavailable_reason().unwrap();
        assert!(reason.contains("LLM_API_KEY"));
    }

    #[test]
    fn initialize_with_key_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path()).unwrap();
        settings.llm_api_key = Some("sk-test".into());
        let core = CoreState::new(settings);
        assert!(core.initialize_ai());
        assert!(core.rag().is_ok());
    }

    #[test]
    fn ready_then_unavailable() {
        let (_dir, core) = offline_core();
        core.set_ai_ready(mock_engine(&core.settings, MockLlmClient::new("ok")));
        assert!(core.ai_ready());
        core.set_ai_unavailable("maintenance");
        assert_eq!(core.ai_unavailable_reason().as_deref(), Some("maintenance"));
    }

    #[test]
    fn open_db_and_directories() {
        let (_dir, core) = offline_core();
        core.ensure_directories().unwrap();
        assert!(core.settings.upload_dir.is_dir());
        let conn = core.open_db().unwrap();
        db::ping(&conn).unwrap();
        assert!(core.db_path().exists());
    }
}

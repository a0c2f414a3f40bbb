use std::path::Path;

use uuid::Uuid;

use super::IngestError;
use crate::config::IndexRetryPolicy;
use crate::db::open_database;
use crate::db::repository::{get_document, update_index_state};
use crate::models::*;
use crate::pipeline::rag::{RagEngine, RagError};
use crate::pipeline::storage::StorageError;

/// Longest wait between two retries of the same document.
const MAX_RETRY_DELAY_SECS: u64 = 3600;

/// Backoff after the `attempts`-th failure: `base * 2^(attempts-1)`, capped.
pub fn retry_delay(policy: &IndexRetryPolicy, attempts: u32) -> chrono::Duration {
    let exponent = attempts.saturating_sub(1).min(20);
    let secs = policy
        .base_delay_secs
        .saturating_mul(1u64 << exponent)
        .min(MAX_RETRY_DELAY_SECS);
    chrono::Duration::seconds(secs as i64)
}

/// Outcome of one attempt, given the attempt count so far.
fn next_state(
    result: Result<usize, String>,
    previous_attempts: u32,
    policy: &IndexRetryPolicy,
) -> IndexState {
    let attempts = previous_attempts.saturating_add(1);
    match result {
        Ok(_) => IndexState {
            status: IndexStatus::Indexed,
            error: None,
            attempts,
            next_retry_at: None,
        },
        Err(error) => IndexState {
            status: IndexStatus::Failed,
            error: Some(error),
            attempts,
            next_retry_at: (attempts < policy.max_attempts)
                .then(|| now() + retry_delay(policy, attempts)),
        },
    }
}

/// Forward a stored document to the index and persist the outcome.
///
/// Index failures are recorded on the row, not returned. The only errors are
/// database errors and the document disappearing mid-flight.
pub async fn index_document(
    engine: &RagEngine,
    db_path: &Path,
    document: &Document,
    policy: &IndexRetryPolicy,
) -> Result<Document, IngestError> {
    let state = match indexable_text(document) {
        None => skipped(document),
        Some(text) => match engine.insert(&document.id, &document.collection_id, text).await {
            // Headings with no body chunk to nothing; retrying cannot change that.
            Err(RagError::Storage(StorageError::EmptyChunks)) => skipped(document),
            result => {
                let result = result.map_err(|e| e.to_string());
                if let Err(error) = &result {
                    tracing::warn!(
                        document_id = %document.id,
                        attempt = document.index.attempts + 1,
                        error = %error,
                        "Document indexing failed"
                    );
                }
                next_state(result, document.index.attempts, policy)
            }
        },
    };

    persist_state(db_path, &document.id, &state)
}

/// Record that indexing could not start because the AI backend is down.
///
/// The attempt count is left alone and no retry time is set, so the retry
/// worker takes the document on its first pass after the backend is ready.
pub fn defer_index(db_path: &Path, document: &Document, reason: &str) -> Result<Document, IngestError> {
    let state = match indexable_text(document) {
        None => skipped(document),
        Some(_) => IndexState {
            status: IndexStatus::Failed,
            error: Some(format!("AI service unavailable: {reason}")),
            attempts: document.index.attempts,
            next_retry_at: None,
        },
    };
    tracing::info!(document_id = %document.id, status = %state.status, "Indexing deferred");
    persist_state(db_path, &document.id, &state)
}

fn indexable_text(document: &Document) -> Option<&str> {
    document.source.text().filter(|t| !t.trim().is_empty())
}

fn skipped(document: &Document) -> IndexState {
    IndexState {
        status: IndexStatus::Skipped,
        error: Some("No extractable text".into()),
        attempts: document.index.attempts,
        next_retry_at: None,
    }
}

fn persist_state(db_path: &Path, document_id: &Uuid, state: &IndexState) -> Result<Document, IngestError> {
    let conn = open_database(db_path)?;
    update_index_state(&conn, document_id, state)?;
    get_document(&conn, document_id)?.ok_or_else(|| IngestError::NotFound("Document not found".into()))
}

/// Re-run indexing for a stored document right away.
pub async fn reprocess_document(
    engine: &RagEngine,
    db_path: &Path,
    document_id: &Uuid,
    policy: &IndexRetryPolicy,
) -> Result<Document, IngestError> {
    let document = {
        let conn = open_database(db_path)?;
        get_document(&conn, document_id)?
            .ok_or_else(|| IngestError::NotFound("Document not found".into()))?
    };
    tracing::info!(document_id = %document_id, "Reprocessing document");
    index_document(engine, db_path, &document, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::repository::count_document_chunks;
    use crate::pipeline::rag::MockLlmClient;
    use crate::pipeline::storage::embedder::MockEmbedder;
    use crate::provisioning::{provision_facility, provision_patient, FacilityInput, PatientInput};
    use crate::test_support::{insert_inline_document, mock_engine, mock_engine_with};

    fn policy() -> IndexRetryPolicy {
        IndexRetryPolicy {
            interval_secs: 1,
            max_attempts: 3,
            base_delay_secs: 30,
        }
    }

    fn stored_document(settings: &Settings, content: &str) -> Document {
        let mut conn = open_database(&settings.database_path).unwrap();
        let f = provision_facility(
            &mut conn,
            &FacilityInput { name: "Clinic".into(), address: None, external_id: None },
        )
        .unwrap();
        let p = provision_patient(
            &mut conn,
            &PatientInput { patient_code: "P1".into(), facility_id: f.facility.id, ..Default::default() },
        )
        .unwrap();
        let id = insert_inline_document(&conn, &p.patient, p.collection.id, content);
        get_document(&conn, &id).unwrap().unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps_at_one_hour() {
        let p = policy();
        assert_eq!(retry_delay(&p, 1).num_seconds(), 30);
        assert_eq!(retry_delay(&p, 2).num_seconds(), 60);
        assert_eq!(retry_delay(&p, 3).num_seconds(), 120);
        assert_eq!(retry_delay(&p, 10).num_seconds(), 3600);
        assert_eq!(retry_delay(&p, 200).num_seconds(), 3600);
    }

    #[test]
    fn last_failure_is_not_rescheduled() {
        let p = policy();
        let state = next_state(Err("down".into()), 1, &p);
        assert_eq!(state.attempts, 2);
        assert!(state.next_retry_at.is_some());

        let state = next_state(Err("down".into()), 2, &p);
        assert_eq!(state.attempts, 3);
        assert!(state.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn successful_index_marks_processed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let doc = stored_document(&settings, "Patient reports mild headache. Advised hydration.");
        let engine = mock_engine(&settings, MockLlmClient::new("ok"));

        let updated = index_document(&engine, &settings.database_path, &doc, &policy()).await.unwrap();
        assert_eq!(updated.index.status, IndexStatus::Indexed);
        assert!(updated.processed());
        assert_eq!(updated.index.attempts, 1);
        assert!(updated.index.error.is_none());

        let conn = open_database(&settings.database_path).unwrap();
        assert!(count_document_chunks(&conn, &doc.id).unwrap() > 0);
    }

    #[tokio::test]
    async fn failed_index_is_saved_with_retry_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let doc = stored_document(&settings, "Chest X-ray clear.");
        let engine = mock_engine_with(&settings, MockLlmClient::new("ok"), MockEmbedder::failing_times(1));

        let failed = index_document(&engine, &settings.database_path, &doc, &policy()).await.unwrap();
        assert_eq!(failed.index.status, IndexStatus::Failed);
        assert!(!failed.processed());
        assert_eq!(failed.index.attempts, 1);
        assert!(failed.index.error.as_deref().unwrap().contains("offline"));
        assert!(failed.index.next_retry_at.unwrap() > failed.created_at);

        let recovered = index_document(&engine, &settings.database_path, &failed, &policy()).await.unwrap();
        assert_eq!(recovered.index.status, IndexStatus::Indexed);
        assert_eq!(recovered.index.attempts, 2);
        assert!(recovered.index.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn blank_text_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let doc = stored_document(&settings, "   ");
        let engine = mock_engine(&settings, MockLlmClient::new("ok"));

        let updated = index_document(&engine, &settings.database_path, &doc, &policy()).await.unwrap();
        assert_eq!(updated.index.status, IndexStatus::Skipped);
        assert!(!updated.processed());
    }

    #[tokio::test]
    async fn heading_only_text_is_skipped_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let engine = mock_engine(&settings, MockLlmClient::new("ok"));
        let doc = stored_document(&settings, "ASSESSMENT:");

        let updated = index_document(&engine, &settings.database_path, &doc, &policy()).await.unwrap();
        assert_eq!(updated.index.status, IndexStatus::Skipped);
        assert_eq!(updated.index.attempts, 0);
        assert!(updated.index.next_retry_at.is_none());

        let conn = open_database(&settings.database_path).unwrap();
        let due = crate::db::repository::documents_due_for_retry(&conn, &now(), 3, 10).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn deferred_document_waits_for_retry_worker() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let doc = stored_document(&settings, "Follow-up in two weeks.");

        let deferred = defer_index(&settings.database_path, &doc, "LLM_API_KEY is not configured").unwrap();
        assert_eq!(deferred.index.status, IndexStatus::Failed);
        assert_eq!(deferred.index.attempts, 0);
        assert!(deferred.index.next_retry_at.is_none());
        assert!(deferred.index.error.as_deref().unwrap().contains("LLM_API_KEY"));

        let conn = open_database(&settings.database_path).unwrap();
        let due = crate::db::repository::documents_due_for_retry(&conn, &now(), 3, 10).unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn reprocess_unknown_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let engine = mock_engine(&settings, MockLlmClient::new("ok"));
        let err = reprocess_document(&engine, &settings.database_path, &Uuid::new_v4(), &policy())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }

    #[tokio::test]
    async fn reprocess_reindexes_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path()).unwrap();
        let doc = stored_document(&settings, "Lisinopril 10mg daily.");
        let engine = mock_engine(&settings, MockLlmClient::new("ok"));

        let first = reprocess_document(&engine, &settings.database_path, &doc.id, &policy()).await.unwrap();
        let second = reprocess_document(&engine, &settings.database_path, &doc.id, &policy()).await.unwrap();
        assert_eq!(first.index.attempts, 1);
        assert_eq!(second.index.attempts, 2);
        assert!(second.processed());
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::indexer::index_document;
use super::IngestError;
use crate::core_state::CoreState;
use crate::db::open_database;
use crate::db::repository::documents_due_for_retry;
use crate::models::now;

/// Documents re-indexed per tick.
const RETRY_BATCH_SIZE: usize = 20;

/// One pass over the retry queue. Returns how many documents became indexed.
///
/// Does nothing while the AI backend is not ready; the queue is left intact.
pub async fn run_retry_pass(core: &CoreState) -> Result<usize, IngestError> {
    let Ok(engine) = core.rag() else {
        tracing::debug!("Index retry skipped: AI service not ready");
        return Ok(0);
    };
    let policy = &core.settings.index_retry;

    let due = {
        let conn = open_database(core.db_path())?;
        documents_due_for_retry(&conn, &now(), policy.max_attempts, RETRY_BATCH_SIZE)?
    };
    if due.is_empty() {
        return Ok(0);
    }

    tracing::info!(count = due.len(), "Retrying failed document indexing");
    let mut indexed = 0;
    for doc in &due {
        match index_document(&engine, core.db_path(), doc, policy).await {
            Ok(updated) if updated.processed() => indexed += 1,
            Ok(_) => {}
            Err(e) => tracing::warn!(document_id = %doc.id, error = %e, "Index retry failed for document"),
        }
    }
    Ok(indexed)
}

/// Spawn the background retry loop. It ticks every
/// `INDEX_RETRY_INTERVAL_SECS` and exits once `shutdown` flips to `true`
/// or its sender is dropped.
pub fn spawn_retry_worker(core: Arc<CoreState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(core.settings.index_retry.interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = period.as_secs(), "Index retry worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match run_retry_pass(&core).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(indexed = n, "Index retry pass completed"),
                        Err(e) => tracing::warn!(error = %e, "Index retry pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Index retry worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{get_document, update_index_state};
    use crate::models::{IndexState, IndexStatus};
    use crate::pipeline::rag::MockLlmClient;
    use crate::provisioning::{provision_facility, provision_patient, FacilityInput, PatientInput};
    use crate::test_support::{insert_inline_document, offline_core, ready_core};

    /// Store a document already marked failed and due now.
    fn failed_document(core: &CoreState, patient_code: &str, attempts: u32) -> uuid::Uuid {
        let mut conn = open_database(core.db_path()).unwrap();
        let f = provision_facility(
            &mut conn,
            &FacilityInput { name: "Clinic".into(), address: None, external_id: None },
        )
        .unwrap();
        let p = provision_patient(
            &mut conn,
            &PatientInput { patient_code: patient_code.into(), facility_id: f.facility.id, ..Default::default() },
        )
        .unwrap();
        let id = insert_inline_document(&conn, &p.patient, p.collection.id, "Potassium 5.8 mmol/L, recheck.");
        let state = IndexState {
            status: IndexStatus::Failed,
            error: Some("timeout".into()),
            attempts,
            next_retry_at: Some(now() - chrono::Duration::seconds(1)),
        };
        update_index_state(&conn, &id, &state).unwrap();
        id
    }

    #[tokio::test]
    async fn pass_reindexes_due_documents() {
        let (_dir, core) = ready_core(MockLlmClient::new("ok"));
        let id = failed_document(&core, "R1", 1);

        assert_eq!(run_retry_pass(&core).await.unwrap(), 1);

        let conn = open_database(core.db_path()).unwrap();
        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.index.status, IndexStatus::Indexed);
        assert_eq!(doc.index.attempts, 2);
    }

    #[tokio::test]
    async fn one_bad_document_does_not_stop_the_batch() {
        let (_dir, core) = ready_core(MockLlmClient::new("ok"));
        let broken = failed_document(&core, "R1", 1);
        let healthy = failed_document(&core, "R2", 1);

        let conn = open_database(core.db_path()).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER refuse_update BEFORE UPDATE ON documents WHEN OLD.id = '{broken}'
             BEGIN SELECT RAISE(ABORT, 'row locked'); END;"
        ))
        .unwrap();

        assert_eq!(run_retry_pass(&core).await.unwrap(), 1);

        let doc = get_document(&conn, &healthy).unwrap().unwrap();
        assert_eq!(doc.index.status, IndexStatus::Indexed);
        let doc = get_document(&conn, &broken).unwrap().unwrap();
        assert_eq!(doc.index.status, IndexStatus::Failed);
    }

    #[tokio::test]
    async fn exhausted_documents_are_left_alone() {
        let (_dir, core) = ready_core(MockLlmClient::new("ok"));
        let max = core.settings.index_retry.max_attempts;
        let id = failed_document(&core, "R1", max);

        assert_eq!(run_retry_pass(&core).await.unwrap(), 0);

        let conn = open_database(core.db_path()).unwrap();
        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.index.status, IndexStatus::Failed);
    }

    #[tokio::test]
    async fn pass_is_noop_without_ai() {
        let (_dir, core) = offline_core();
        let id = failed_document(&core, "R1", 1);

        assert_eq!(run_retry_pass(&core).await.unwrap(), 0);

        let conn = open_database(core.db_path()).unwrap();
        let doc = get_document(&conn, &id).unwrap().unwrap();
        assert_eq!(doc.index.attempts, 1);
    }

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let (_dir, core) = offline_core();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_retry_worker(core, rx);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}

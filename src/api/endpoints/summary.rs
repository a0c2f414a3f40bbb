//! `GET /api/v1/patient/:code/summary`
//!
//! Always answers from the database. The AI summary is attached when the
//! backend is ready and is reported as `unavailable` or `failed` otherwise.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::api::endpoints::documents::DocumentResponse;
use crate::api::endpoints::find_patient;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{count_patient_documents_by, list_documents, DocumentCountColumn};
use crate::models::{DocumentFilter, Gender};
use crate::pipeline::insights::AI_DISCLAIMER;
use crate::pipeline::rag::prompt::{document_history, patient_summary_prompt};
use crate::pipeline::rag::GenerationOptions;

const RECENT_DOCUMENTS: usize = 5;
const SUMMARY_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiSummaryStatus {
    Generated,
    Failed,
    Unavailable,
}

#[derive(Debug, Serialize)]
pub struct PatientSummary {
    pub patient_identifier_id: Uuid,
    pub patient_code: String,
    pub facility_id: Uuid,
    pub age_range: Option<String>,
    pub gender: Option<Gender>,
    pub created_at: NaiveDateTime,
    pub total_documents: i64,
    pub documents_by_type: BTreeMap<String, i64>,
    pub documents_by_status: BTreeMap<String, i64>,
    pub recent_documents: Vec<DocumentResponse>,
    pub ai_summary: Option<String>,
    pub ai_status: AiSummaryStatus,
    pub disclaimer: &'static str,
}

pub async fn patient_summary(
    State(ctx): State<ApiContext>,
    Path(code): Path<String>,
) -> Result<Json<PatientSummary>, ApiError> {
    let (patient, by_type, by_status, recent) = {
        let conn = ctx.core.open_db()?;
        let patient = find_patient(&conn, &code, None)?;
        let by_type = count_patient_documents_by(&conn, &patient.id, DocumentCountColumn::DocumentType)?;
        let by_status = count_patient_documents_by(&conn, &patient.id, DocumentCountColumn::IndexStatus)?;
        let recent = list_documents(
            &conn,
            &DocumentFilter {
                patient_identifier_id: Some(patient.id),
                limit: Some(RECENT_DOCUMENTS),
                ..Default::default()
            },
        )?;
        (patient, by_type, by_status, recent)
    };

    let (ai_summary, ai_status) = match ctx.core.rag() {
        Ok(engine) => {
            let history = document_history("Recent Documents", &recent, SUMMARY_EXCERPT_CHARS, true);
            let prompt = patient_summary_prompt(&patient, &history);
            match engine.complete(&prompt, &GenerationOptions::default()).await {
                Ok(text) => (Some(text), AiSummaryStatus::Generated),
                Err(e) => {
                    tracing::warn!(patient_id = %patient.id, error = %e, "Patient summary generation failed");
                    (None, AiSummaryStatus::Failed)
                }
            }
        }
        Err(_) => (None, AiSummaryStatus::Unavailable),
    };

    Ok(Json(PatientSummary {
        patient_identifier_id: patient.id,
        patient_code: patient.patient_code,
        facility_id: patient.facility_id,
        age_range: patient.age_range,
        gender: patient.gender,
        created_at: patient.created_at,
        total_documents: by_type.values().sum(),
        documents_by_type: by_type,
        documents_by_status: by_status,
        recent_documents: recent.into_iter().map(DocumentResponse::from).collect(),
        ai_summary,
        ai_status,
        disclaimer: AI_DISCLAIMER,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::endpoints::test_helpers::*;
    use crate::pipeline::rag::MockLlmClient;
    use crate::test_support::{offline_core, ready_core};

    async fn ingest(core: &std::sync::Arc<crate::core_state::CoreState>, patient_id: uuid::Uuid, kind: &str, text: &str) {
        let (status, _) = send(
            app(core),
            post_json(
                "/api/v1/medical-documents",
                json!({"content": text, "patient_identifier_id": patient_id, "document_type": kind}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn summary_without_ai_still_succeeds() {
        let (_dir, core) = offline_core();
        let seeded = seed(&core, "PAT1");
        ingest(&core, seeded.patient_id, "clinical_note", "Chest pain resolved.").await;
        ingest(&core, seeded.patient_id, "lab_result", "Troponin negative.").await;

        let (status, json) = send(app(&core), get("/api/v1/patient/PAT1/summary")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_documents"], 2);
        assert_eq!(json["documents_by_type"], json!({"clinical_note": 1, "lab_result": 1}));
        assert_eq!(json["documents_by_status"], json!({"failed": 2}));
        assert_eq!(json["recent_documents"].as_array().unwrap().len(), 2);
        assert!(json["recent_documents"][0].get("content").is_none());
        assert!(json["ai_summary"].is_null());
        assert_eq!(json["ai_status"], "unavailable");
    }

    #[tokio::test]
    async fn summary_with_ai() {
        let llm = MockLlmClient::new("Stable after chest pain workup.");
        let (_dir, core) = ready_core(llm.clone());
        let seeded = seed(&core, "PAT1");
        ingest(&core, seeded.patient_id, "clinical_note", "Chest pain resolved.").await;

        let (_, json) = send(app(&core), get("/api/v1/patient/PAT1/summary")).await;
        assert_eq!(json["ai_status"], "generated");
        assert_eq!(json["ai_summary"], "Stable after chest pain workup.");
        assert_eq!(json["documents_by_status"], json!({"indexed": 1}));
        assert!(llm.prompts().last().unwrap().contains("Chest pain resolved."));
    }

    #[tokio::test]
    async fn failed_generation_is_reported() {
        let (_dir, core) = ready_core(MockLlmClient::failing("provider down"));
        seed(&core, "PAT1");
        let (status, json) = send(app(&core), get("/api/v1/patient/PAT1/summary")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ai_status"], "failed");
        assert_eq!(json["total_documents"], 0);
    }

    #[tokio::test]
    async fn unknown_patient_is_404() {
        let (_dir, core) = offline_core();
        let (status, _) = send(app(&core), get("/api/v1/patient/NOPE/summary")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

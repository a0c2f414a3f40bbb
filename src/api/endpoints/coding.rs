//! `POST /api/v1/suggest/codes`: ICD-10 and CPT suggestions from clinical notes.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::find_patient;
use crate::api::error::ApiError;
use crate::api::types::{elapsed_secs, ApiContext};
use crate::models::now;
use crate::pipeline::insights::{extract_codes, CodeSuggestion, CodingRequest, Extraction, AI_DISCLAIMER};
use crate::pipeline::rag::prompt::coding_prompt;
use crate::pipeline::rag::GenerationOptions;

const MIN_NOTES_CHARS: usize = 10;

fn default_true() -> bool {
    true
}

fn default_max_suggestions() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct CodeSuggestionRequest {
    pub clinical_notes: String,
    #[serde(default)]
    pub patient_code: Option<String>,
    #[serde(default)]
    pub facility_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub include_procedures: bool,
    #[serde(default = "default_true")]
    pub include_diagnoses: bool,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

#[derive(Debug, Serialize)]
pub struct CodeSuggestionResponse {
    pub request_id: Uuid,
    pub patient_code: Option<String>,
    pub icd10_codes: Vec<CodeSuggestion>,
    pub cpt_codes: Vec<CodeSuggestion>,
    pub clinical_summary: String,
    pub confidence_score: f64,
    pub processing_notes: Vec<String>,
    pub extraction: Extraction,
    pub processing_time: f64,
    pub created_at: NaiveDateTime,
    pub disclaimer: &'static str,
}

pub async fn suggest_codes(
    State(ctx): State<ApiContext>,
    payload: Result<Json<CodeSuggestionRequest>, JsonRejection>,
) -> Result<Json<CodeSuggestionResponse>, ApiError> {
    let Json(req) = payload?;
    let notes = req.clinical_notes.trim();
    if notes.chars().count() < MIN_NOTES_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Clinical notes must be at least {MIN_NOTES_CHARS} characters"
        )));
    }

    let patient_code = match req.patient_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => {
            let conn = ctx.core.open_db()?;
            Some(find_patient(&conn, code, req.facility_id.as_ref())?.patient_code)
        }
        None => None,
    };

    let start = Instant::now();
    let engine = ctx.core.rag()?;
    let max_suggestions = req.max_suggestions.max(1);
    let prompt = coding_prompt(notes, req.include_diagnoses, req.include_procedures, max_suggestions);
    let reply = engine.complete(&prompt, &GenerationOptions::default()).await?;

    let extracted = extract_codes(
        &reply,
        CodingRequest {
            include_diagnoses: req.include_diagnoses,
            include_procedures: req.include_procedures,
            max_suggestions,
        },
    );

    let request_id = Uuid::new_v4();
    let processing_time = elapsed_secs(start);
    tracing::info!(
        request_id = %request_id,
        icd10 = extracted.icd10_suggestions.len(),
        cpt = extracted.cpt_suggestions.len(),
        processing_time,
        "Code suggestions generated"
    );

    Ok(Json(CodeSuggestionResponse {
        request_id,
        patient_code,
        icd10_codes: extracted.icd10_suggestions,
        cpt_codes: extracted.cpt_suggestions,
        clinical_summary: extracted.clinical_summary,
        confidence_score: extracted.confidence_score,
        processing_notes: extracted.processing_notes,
        extraction: extracted.extraction,
        processing_time,
        created_at: now(),
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

    const NOTES: &str = "Type 2 diabetes with poor control, office visit for medication review.";

    #[tokio::test]
    async fn structured_codes_are_returned() {
        let reply = r#"```json
{"icd10_codes": [{"code": "E11.65", "description": "Type 2 diabetes with hyperglycemia", "confidence": 0.9, "category": "primary"}],
 "cpt_codes": [{"code": "99214", "description": "Office visit, moderate", "confidence": 0.8}],
 "clinical_summary": "Poorly controlled type 2 diabetes.",
 "confidence_score": 0.85,
 "processing_notes": []}
```"#;
        let llm = MockLlmClient::new(reply);
        let (_dir, core) = ready_core(llm.clone());
        seed(&core, "PAT1");

        let (status, json) = send(
            app(&core),
            post_json("/api/v1/suggest/codes", json!({"clinical_notes": NOTES, "patient_code": "PAT1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["extraction"], "structured");
        assert_eq!(json["patient_code"], "PAT1");
        assert_eq!(json["icd10_codes"][0]["code"], "E11.65");
        assert_eq!(json["icd10_codes"][0]["code_type"], "ICD-10");
        assert_eq!(json["cpt_codes"][0]["category"], "procedure");
        assert!(llm.prompts()[0].contains("Maximum suggestions: 10"));
    }

    #[tokio::test]
    async fn diagnoses_only_drops_cpt() {
        let reply = "E11.9 Type 2 diabetes mellitus without complications\nCPT 99213 office visit";
        let (_dir, core) = ready_core(MockLlmClient::new(reply));

        let (status, json) = send(
            app(&core),
            post_json(
                "/api/v1/suggest/codes",
                json!({"clinical_notes": NOTES, "include_procedures": false}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["extraction"], "heuristic");
        assert!(json["cpt_codes"].as_array().unwrap().is_empty());
        assert!(json["patient_code"].is_null());
    }

    #[tokio::test]
    async fn short_notes_are_400() {
        let (_dir, core) = ready_core(MockLlmClient::new("x"));
        let (status, json) =
            send(app(&core), post_json("/api/v1/suggest/codes", json!({"clinical_notes": "  too short "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("10 characters"));
    }

    #[tokio::test]
    async fn patient_outside_facility_is_404() {
        let (_dir, core) = offline_core();
        seed(&core, "PAT1");
        let (status, _) = send(
            app(&core),
            post_json(
                "/api/v1/suggest/codes",
                json!({"clinical_notes": NOTES, "patient_code": "PAT1", "facility_id": uuid::Uuid::new_v4()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send(app(&core), post_json("/api/v1/suggest/codes", json!({"clinical_notes": NOTES}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

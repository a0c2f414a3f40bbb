//! `POST /api/v1/generate/discharge-instructions`
//!
//! Falls back to a fixed template when the AI backend is not ready or the
//! provider call fails, so a discharge is never blocked on the model.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::find_facility;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{get_patient, list_documents};
use crate::models::{now, DocumentFilter};
use crate::pipeline::insights::AI_DISCLAIMER;
use crate::pipeline::rag::prompt::{discharge_fallback, discharge_prompt, document_history, DischargePrompt};
use crate::pipeline::rag::GenerationOptions;

const HISTORY_DOCUMENTS: usize = 5;
const HISTORY_EXCERPT_CHARS: usize = 200;

fn default_language() -> String {
    "English".into()
}

fn default_reading_level() -> String {
    "8th grade".into()
}

#[derive(Debug, Deserialize)]
pub struct DischargeRequest {
    pub patient_identifier_id: Uuid,
    pub diagnosis: String,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub follow_up_instructions: Option<String>,
    #[serde(default)]
    pub activity_restrictions: Option<String>,
    #[serde(default)]
    pub diet_instructions: Option<String>,
    #[serde(default)]
    pub warning_signs: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default = "default_language")]
    pub language_preference: String,
    #[serde(default = "default_reading_level")]
    pub reading_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedBy {
    Ai,
    Fallback,
}

#[derive(Debug, Serialize)]
pub struct DischargeResponse {
    pub instruction_id: Uuid,
    pub patient_identifier_id: Uuid,
    pub patient_code: String,
    pub discharge_instructions: String,
    pub medication_explanations: Vec<String>,
    pub follow_up_summary: String,
    pub emergency_contact_info: String,
    pub generated_at: NaiveDateTime,
    pub language: String,
    pub reading_level: String,
    pub generated_by: GeneratedBy,
    pub disclaimer: &'static str,
}

pub async fn generate_discharge_instructions(
    State(ctx): State<ApiContext>,
    payload: Result<Json<DischargeRequest>, JsonRejection>,
) -> Result<Json<DischargeResponse>, ApiError> {
    let Json(req) = payload?;
    if req.diagnosis.trim().is_empty() {
        return Err(ApiError::BadRequest("Diagnosis must not be empty".into()));
    }

    let (patient, facility, documents) = {
        let conn = ctx.core.open_db()?;
        let patient = get_patient(&conn, &req.patient_identifier_id)?
            .ok_or_else(|| ApiError::NotFound("Patient identifier not found".into()))?;
        let facility = find_facility(&conn, &patient.facility_id)?;
        let documents = list_documents(
            &conn,
            &DocumentFilter {
                patient_identifier_id: Some(patient.id),
                limit: Some(HISTORY_DOCUMENTS),
                ..Default::default()
            },
        )?;
        (patient, facility, documents)
    };

    let history = document_history("Recent Medical History", &documents, HISTORY_EXCERPT_CHARS, false);
    let input = DischargePrompt {
        patient: &patient,
        facility_name: &facility.name,
        diagnosis: req.diagnosis.trim(),
        medications: &req.medications,
        follow_up_instructions: req.follow_up_instructions.as_deref(),
        activity_restrictions: req.activity_restrictions.as_deref(),
        diet_instructions: req.diet_instructions.as_deref(),
        warning_signs: req.warning_signs.as_deref(),
        additional_notes: req.additional_notes.as_deref(),
        language: &req.language_preference,
        reading_level: &req.reading_level,
        history: &history,
    };

    let generated = match ctx.core.rag() {
        Ok(engine) => engine
            .complete(&discharge_prompt(&input), &GenerationOptions::default())
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let (discharge_instructions, generated_by) = match generated {
        Ok(text) => (text, GeneratedBy::Ai),
        Err(reason) => {
            tracing::warn!(patient_id = %patient.id, reason = %reason, "Using fallback discharge instructions");
            (discharge_fallback(&input), GeneratedBy::Fallback)
        }
    };

    let medication_explanations = req
        .medications
        .iter()
        .map(|m| format!("Take {m} as prescribed by your doctor"))
        .collect();
    let follow_up_summary = req
        .follow_up_instructions
        .clone()
        .unwrap_or_else(|| "Follow up with your primary care provider as needed".into());

    Ok(Json(DischargeResponse {
        instruction_id: Uuid::new_v4(),
        patient_identifier_id: patient.id,
        patient_code: patient.patient_code.clone(),
        discharge_instructions,
        medication_explanations,
        follow_up_summary,
        emergency_contact_info: format!("For emergencies, contact {} or call 911", facility.name),
        generated_at: now(),
        language: req.language_preference,
        reading_level: req.reading_level,
        generated_by,
        disclaimer: AI_DISCLAIMER,
    }))
}

//! `POST /api/v1/analyze/results` (multipart form)
//!
//! Fields: `patient_code`, `facility_id`, `text_data` and/or `file`,
//! `analysis_type` (default `comprehensive`), `include_history` (default true).

use axum::extract::{Multipart, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::api::endpoints::find_patient;
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::db::repository::list_documents;
use crate::models::{now, DocumentFilter};
use crate::pipeline::import::{extract_text, validate_upload, ANALYSIS_UPLOADS};
use crate::pipeline::insights::{extract_analysis, AbnormalFlag, DiagnosticInsight, Extraction, AI_DISCLAIMER};
use crate::pipeline::rag::prompt::{analysis_prompt, document_history};
use crate::pipeline::rag::GenerationOptions;

const HISTORY_DOCUMENTS: usize = 5;
const HISTORY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub analysis_id: Uuid,
    pub patient_code: String,
    pub facility_id: Uuid,
    pub analysis_type: String,
    pub abnormal_flags: Vec<AbnormalFlag>,
    pub diagnostic_insights: Vec<DiagnosticInsight>,
    pub summary: String,
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
    pub extraction: Extraction,
    pub created_at: NaiveDateTime,
    pub disclaimer: &'static str,
}

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct AnalysisForm {
    patient_code: Option<String>,
    facility_id: Option<Uuid>,
    text_data: Option<String>,
    file: Option<UploadedFile>,
    analysis_type: Option<String>,
    include_history: Option<bool>,
}

async fn read_form(mut multipart: Multipart) -> Result<AnalysisForm, ApiError> {
    let mut form = AnalysisForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !filename.is_empty() || !bytes.is_empty() {
                    form.file = Some(UploadedFile {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "patient_code" => form.patient_code = Some(field.text().await?),
            "facility_id" => form.facility_id = Some(parse_id(&field.text().await?, "facility")?),
            "text_data" => form.text_data = Some(field.text().await?).filter(|t| !t.trim().is_empty()),
            "analysis_type" => form.analysis_type = Some(field.text().await?).filter(|t| !t.trim().is_empty()),
            "include_history" => {
                let raw = field.text().await?;
                form.include_history = Some(match raw.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => true,
                    "false" | "0" | "no" | "off" => false,
                    _ => return Err(ApiError::BadRequest(format!("Invalid include_history '{raw}'"))),
                });
            }
            other => tracing::debug!(field = other, "Ignoring unknown analysis field"),
        }
    }
    Ok(form)
}

/// Text sent to the model: the inline data, then the file's text or a note
/// that the file could not be read.
fn compose_content(
    text_data: Option<&str>,
    file: Option<&UploadedFile>,
    max_file_size: u64,
) -> Result<String, ApiError> {
    let mut content = String::new();
    if let Some(text) = text_data {
        content.push_str(&format!("Text Data:\n{}\n\n", text.trim()));
    }
    if let Some(file) = file {
        let format = validate_upload(
            &file.filename,
            file.content_type.as_deref(),
            file.bytes.len() as u64,
            max_file_size,
            &ANALYSIS_UPLOADS,
        )?;
        match extract_text(&file.bytes, format.category) {
            Some(text) => content.push_str(&format!("File Content ({}):\n{}\n\n", file.filename, text)),
            None => content.push_str(&format!(
                "Attached file: {} ({}). Its contents could not be extracted as text.\n\n",
                file.filename,
                format.category.as_str()
            )),
        }
    }
    Ok(content)
}

pub async fn analyze_results(
    State(ctx): State<ApiContext>,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let form = read_form(multipart).await?;

    let patient_code = form
        .patient_code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'patient_code' field".into()))?;
    let facility_id = form
        .facility_id
        .ok_or_else(|| ApiError::BadRequest("Missing 'facility_id' field".into()))?;
    if form.text_data.is_none() && form.file.is_none() {
        return Err(ApiError::BadRequest("Either text_data or file must be provided".into()));
    }

    let (patient, history) = {
        let conn = ctx.core.open_db()?;
        let patient = find_patient(&conn, &patient_code, Some(&facility_id))?;
        let history = if form.include_history.unwrap_or(true) {
            let documents = list_documents(
                &conn,
                &DocumentFilter {
                    patient_identifier_id: Some(patient.id),
                    limit: Some(HISTORY_DOCUMENTS),
                    ..Default::default()
                },
            )?;
            document_history("Patient History", &documents, HISTORY_EXCERPT_CHARS, true)
        } else {
            String::new()
        };
        (patient, history)
    };

    let content = compose_content(
        form.text_data.as_deref(),
        form.file.as_ref(),
        ctx.core.settings.max_file_size,
    )?;
    let analysis_type = form.analysis_type.unwrap_or_else(|| "comprehensive".into());

    let engine = ctx.core.rag()?;
    let prompt = analysis_prompt(&patient.patient_code, &analysis_type, &content, &history);
    let reply = engine.complete(&prompt, &GenerationOptions::default()).await?;
    let extracted = extract_analysis(&reply);

    let analysis_id = Uuid::new_v4();
    tracing::info!(
        analysis_id = %analysis_id,
        patient_id = %patient.id,
        flags = extracted.abnormal_flags.len(),
        extraction = ?extracted.extraction,
        "Results analyzed"
    );

    Ok(Json(AnalysisResponse {
        analysis_id,
        patient_code: patient.patient_code,
        facility_id,
        analysis_type,
        abnormal_flags: extracted.abnormal_flags,
        diagnostic_insights: extracted.diagnostic_insights,
        summary: extracted.summary,
        confidence_score: extracted.confidence_score,
        recommendations: extracted.recommendations,
        extraction: extracted.extraction,
        created_at: now(),
        disclaimer: AI_DISCLAIMER,
    }))
}

//! `POST /api/v1/clinical`: clinical question answering with structured insights.
//!
//! Retrieval is scoped to the patient's collection when a patient is named,
//! to the facility's collections when only a facility is named, and to every
//! collection otherwise.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::{find_facility, find_patient};
use crate::api::error::ApiError;
use crate::api::types::{elapsed_secs, ApiContext};
use crate::db::repository::{find_facility_collection, list_documents, list_facility_collections};
use crate::models::*;
use crate::pipeline::insights::{extract_clinical, ClinicalInsight, Extraction, AI_DISCLAIMER};
use crate::pipeline::rag::prompt::{clinical_prompt, document_history, ClinicalPrompt};
use crate::pipeline::rag::GenerationOptions;
use crate::pipeline::storage::types::SearchScope;

const CONTEXT_EXCERPT_CHARS: usize = 300;
const CONTEXT_RELEVANCE: f64 = 0.8;

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct ClinicalQueryRequest {
    pub query: String,
    #[serde(default)]
    pub patient_code: Option<String>,
    #[serde(default)]
    pub facility_id: Option<Uuid>,
    #[serde(default)]
    pub query_type: ClinicalQueryType,
    #[serde(default = "default_true")]
    pub include_context: bool,
    #[serde(default = "default_true")]
    pub include_sources: bool,
    #[serde(default)]
    pub date_range_days: Option<u32>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Serialize)]
pub struct SourceDocument {
    pub document_id: Uuid,
    pub document_type: DocumentType,
    pub date: NaiveDateTime,
    pub relevance_score: f64,
}

#[derive(Debug, Serialize)]
pub struct ClinicalQueryResponse {
    pub query: String,
    pub patient_code: Option<String>,
    pub facility_id: Option<Uuid>,
    pub response: String,
    pub clinical_insights: Vec<ClinicalInsight>,
    pub source_documents: Vec<SourceDocument>,
    pub related_conditions: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence_score: f64,
    pub query_type: ClinicalQueryType,
    pub extraction: Extraction,
    pub processing_time: f64,
    pub created_at: NaiveDateTime,
    pub disclaimer: &'static str,
}

/// Everything read from the database before the model is called.
struct ClinicalContext {
    patient: Option<PatientIdentifier>,
    facility_name: Option<String>,
    documents: Vec<Document>,
    scope: SearchScope,
}

/// Start of a `days`-long window ending now. A window reaching past the
/// earliest representable time has no lower bound.
fn window_start(days: u32) -> Option<NaiveDateTime> {
    chrono::Duration::try_days(i64::from(days)).and_then(|span| now().checked_sub_signed(span))
}

fn load_context(ctx: &ApiContext, req: &ClinicalQueryRequest) -> Result<ClinicalContext, ApiError> {
    let conn = ctx.core.open_db()?;

    let facility = req.facility_id.as_ref().map(|id| find_facility(&conn, id)).transpose()?;
    let patient = match req.patient_code.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(code) => Some(find_patient(&conn, code, req.facility_id.as_ref())?),
        None => None,
    };

    let documents = match (&patient, req.include_context) {
        (Some(p), true) => list_documents(
            &conn,
            &DocumentFilter {
                patient_identifier_id: Some(p.id),
                created_after: req.date_range_days.and_then(window_start),
                limit: Some(req.max_results.max(1)),
                ..Default::default()
            },
        )?,
        _ => Vec::new(),
    };

    let scope = match (&patient, &facility) {
        (Some(p), _) => {
            let name = patient_collection_name(&p.patient_code);
            let collection = find_facility_collection(&conn, &p.facility_id, &name)?
                .ok_or_else(|| ApiError::NotFound("Patient collection not found".into()))?;
            SearchScope::Collections(vec![collection.id])
        }
        (None, Some(f)) => SearchScope::Collections(
            list_facility_collections(&conn, &f.id)?.into_iter().map(|c| c.id).collect(),
        ),
        (None, None) => SearchScope::All,
    };

    Ok(ClinicalContext {
        patient,
        facility_name: facility.map(|f| f.name),
        documents,
        scope,
    })
}

pub async fn clinical_query(
    State(ctx): State<ApiContext>,
    payload: Result<Json<ClinicalQueryRequest>, JsonRejection>,
) -> Result<Json<ClinicalQueryResponse>, ApiError> {
    let Json(req) = payload?;
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }

    let start = Instant::now();
    let context = load_context(&ctx, &req)?;
    let engine = ctx.core.rag()?;

    let history = document_history("Patient Context", &context.documents, CONTEXT_EXCERPT_CHARS, true);
    let prompt = clinical_prompt(&ClinicalPrompt {
        query: &req.query,
        query_type: req.query_type,
        patient_code: context.patient.as_ref().map(|p| p.patient_code.as_str()),
        facility_name: context.facility_name.as_deref(),
        context: &history,
    });

    let answer = engine
        .query(&prompt, &context.scope, Some(req.max_results.max(1)), &GenerationOptions::default())
        .await?;

    let source_count = context.documents.len() + answer.sources.len();
    let extracted = extract_clinical(&answer.text, req.query_type, source_count);

    let source_documents = if req.include_sources {
        context
            .documents
            .iter()
            .map(|d| SourceDocument {
                document_id: d.id,
                document_type: d.document_type,
                date: d.created_at,
                relevance_score: CONTEXT_RELEVANCE,
            })
            .collect()
    } else {
        Vec::new()
    };

    let processing_time = elapsed_secs(start);
    tracing::info!(
        query_type = %req.query_type,
        context_documents = context.documents.len(),
        retrieved = answer.sources.len(),
        extraction = ?extracted.extraction,
        processing_time,
        "Clinical query answered"
    );

    Ok(Json(ClinicalQueryResponse {
        query: req.query,
        patient_code: context.patient.map(|p| p.patient_code),
        facility_id: req.facility_id,
        response: extracted.response,
        clinical_insights: extracted.insights,
        source_documents,
        related_conditions: extracted.related_conditions,
        recommendations: extracted.recommendations,
        confidence_score: extracted.confidence_score,
        query_type: req.query_type,
        extraction: extracted.extraction,
        processing_time,
        created_at: now(),
        disclaimer: AI_DISCLAIMER,
    }))
}

//! Retrieval-augmented query endpoints.
//!
//! - `POST /api/v1/query`               (all indexed documents)
//! - `GET  /api/v1/query/health`
//! - `POST /api/v1/query-patient-data`  (one patient's collection)

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::find_patient;
use crate::api::error::ApiError;
use crate::api::types::{elapsed_secs, ApiContext};
use crate::db::repository::find_facility_collection;
use crate::models::{patient_collection_name, Gender};
use crate::pipeline::insights::AI_DISCLAIMER;
use crate::pipeline::rag::prompt::{excerpt, patient_query_prompt};
use crate::pipeline::rag::GenerationOptions;
use crate::pipeline::storage::types::{ScoredChunk, SearchScope};

const SOURCE_EXCERPT_CHARS: usize = 500;
const TOP_K_WITH_SOURCES: usize = 5;
const TOP_K_WITHOUT_SOURCES: usize = 3;

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

#[derive(Debug, Serialize)]
pub struct SourceMetadata {
    pub collection_id: Uuid,
    pub chunk_index: usize,
    pub section_title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuerySource {
    pub document_id: Uuid,
    pub content: String,
    pub metadata: SourceMetadata,
    pub score: f32,
}

impl From<ScoredChunk> for QuerySource {
    fn from(chunk: ScoredChunk) -> Self {
        Self {
            document_id: chunk.document_id,
            content: excerpt(&chunk.content, SOURCE_EXCERPT_CHARS),
            metadata: SourceMetadata {
                collection_id: chunk.collection_id,
                chunk_index: chunk.chunk_index,
                section_title: chunk.section_title,
            },
            score: chunk.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub response: String,
    pub sources: Vec<QuerySource>,
    pub model: String,
    pub processing_time: f64,
    pub disclaimer: &'static str,
}

pub async fn query(
    State(ctx): State<ApiContext>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(req) = payload?;
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }

    let start = Instant::now();
    let engine = ctx.core.rag()?;
    let top_k = if req.include_sources { TOP_K_WITH_SOURCES } else { TOP_K_WITHOUT_SOURCES };
    let options = GenerationOptions {
        max_tokens: Some(req.max_tokens),
        temperature: Some(req.temperature),
    };

    let answer = engine.query(&req.query, &SearchScope::All, Some(top_k), &options).await?;
    let sources = if req.include_sources {
        answer.sources.into_iter().map(QuerySource::from).collect()
    } else {
        Vec::new()
    };

    let processing_time = elapsed_secs(start);
    tracing::info!(top_k, sources = sources.len(), processing_time, "Query answered");

    Ok(Json(QueryResponse {
        query: req.query,
        response: answer.text,
        sources,
        model: engine.model().to_string(),
        processing_time,
        disclaimer: AI_DISCLAIMER,
    }))
}

#[derive(Debug, Serialize)]
pub struct QueryHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub ai_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub async fn health(State(ctx): State<ApiContext>) -> Json<QueryHealth> {
    let reason = ctx.core.ai_unavailable_reason();
    Json(QueryHealth {
        status: if reason.is_none() { "ready" } else { "not_ready" },
        service: "query_endpoint",
        ai_ready: reason.is_none(),
        reason,
    })
}

#[derive(Debug, Deserialize)]
pub struct PatientQueryRequest {
    pub patient_code: String,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct PatientMetadata {
    pub age_range: Option<String>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Serialize)]
pub struct PatientQueryResponse {
    pub patient_code: String,
    pub query: String,
    pub response: String,
    pub patient_metadata: PatientMetadata,
    pub disclaimer: &'static str,
}

/// Answer a question from one patient's collection only.
pub async fn query_patient_data(
    State(ctx): State<ApiContext>,
    payload: Result<Json<PatientQueryRequest>, JsonRejection>,
) -> Result<Json<PatientQueryResponse>, ApiError> {
    let Json(req) = payload?;
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".into()));
    }

    let (patient, collection) = {
        let conn = ctx.core.open_db()?;
        let patient = find_patient(&conn, &req.patient_code, None)?;
        let collection = find_facility_collection(
            &conn,
            &patient.facility_id,
            &patient_collection_name(&patient.patient_code),
        )?
        .ok_or_else(|| ApiError::NotFound("Patient collection not found".into()))?;
        (patient, collection)
    };

    let engine = ctx.core.rag()?;
    let prompt = patient_query_prompt(&req.query, &patient);
    let answer = engine
        .query(
            &prompt,
            &SearchScope::Collections(vec![collection.id]),
            None,
            &GenerationOptions::default(),
        )
        .await?;

    tracing::info!(patient_id = %patient.id, sources = answer.sources.len(), "Patient query answered");

    Ok(Json(PatientQueryResponse {
        patient_code: patient.patient_code,
        query: req.query,
        response: answer.text,
        patient_metadata: PatientMetadata {
            age_range: patient.age_range,
            gender: patient.gender,
        },
        disclaimer: AI_DISCLAIMER,
    }))
}

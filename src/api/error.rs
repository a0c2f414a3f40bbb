//! API error type. Every failure is rendered as `{"detail": "..."}`.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::pipeline::import::ImportError;
use crate::pipeline::ingestion::IngestError;
use crate::pipeline::rag::RagError;
use crate::provisioning::ProvisionError;

/// Message shown for 500s unless debug mode exposes the cause.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Cause of a 500, attached to the response for the debug middleware.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ApiError::ServiceUnavailable(detail) => (StatusCode::SERVICE_UNAVAILABLE, detail.clone()),
            ApiError::Internal(cause) => {
                tracing::error!(error = %cause, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE.to_string())
            }
        };

        let mut response = (status, Json(ErrorBody { detail })).into_response();
        if let ApiError::Internal(cause) = self {
            response.extensions_mut().insert(InternalErrorDetail(cause));
        }
        response
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AiUnavailable(reason) => {
                ApiError::ServiceUnavailable(format!("AI service is not ready: {reason}"))
            }
            CoreError::Database(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => {
                ApiError::NotFound(format!("{entity_type} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Validation(detail) => ApiError::BadRequest(detail),
            ProvisionError::NotFound(detail) => ApiError::NotFound(detail),
            ProvisionError::Database(e) => e.into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Io(e) => ApiError::Internal(format!("Failed to store upload: {e}")),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Import(e) => e.into(),
            IngestError::Validation(detail) => ApiError::BadRequest(detail),
            IngestError::NotFound(detail) => ApiError::NotFound(detail),
            IngestError::Database(e) => e.into(),
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError::Internal(format!("AI request failed: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

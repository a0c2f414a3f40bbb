//! Shared types for the API layer.

use std::sync::Arc;

use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core_state::CoreState;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Parse a UUID taken from a path or form field, naming it in the error.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID: {e}")))
}

/// Seconds since `start`, as reported in `processing_time` fields.
pub fn elapsed_secs(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

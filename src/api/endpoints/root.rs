//! Unprefixed service routes.
//!
//! - `GET /`             API banner
//! - `GET /info`         name, version, features, accepted formats
//! - `GET /health`       AI readiness and a real database check
//! - `GET /debug/config` effective settings (mounted only when `DEBUG=true`)

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::config::{Settings, API_V1_STR, APP_NAME, APP_VERSION};
use crate::db;
use crate::pipeline::import::DOCUMENT_UPLOADS;

#[derive(Serialize)]
pub struct Banner {
    pub message: String,
    pub version: &'static str,
    pub description: &'static str,
    pub health_check: &'static str,
    pub api_v1: &'static str,
}

pub async fn banner() -> Json<Banner> {
    Json(Banner {
        message: format!("{APP_NAME} API"),
        version: APP_VERSION,
        description: "Patient-isolated medical document indexing and clinical query service",
        health_check: "/health",
        api_v1: API_V1_STR,
    })
}

#[derive(Serialize)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub api_version: &'static str,
    pub features: Vec<&'static str>,
    pub supported_formats: Vec<&'static str>,
}

pub async fn info(State(ctx): State<ApiContext>) -> Json<AppInfo> {
    Json(AppInfo {
        name: APP_NAME,
        version: APP_VERSION,
        environment: ctx.core.settings.environment.clone(),
        api_version: API_V1_STR,
        features: vec![
            "Facility and patient provisioning",
            "Document upload and indexing",
            "Patient-scoped vector search",
            "Clinical queries with structured insights",
            "ICD-10 and CPT code suggestions",
            "Discharge instructions",
            "Results analysis",
        ],
        supported_formats: DOCUMENT_UPLOADS.extensions.to_vec(),
    })
}

#[derive(Serialize)]
pub struct HealthServices {
    pub llm_index: &'static str,
    pub database: &'static str,
    pub api: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub services: HealthServices,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_unavailable_reason: Option<String>,
}

/// Always 200; `status` is `degraded` when the AI backend or the database is not usable.
pub async fn health(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let database_ok = match ctx.core.open_db() {
        Ok(conn) => db::ping(&conn).is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not open the database");
            false
        }
    };
    let ai_reason = ctx.core.ai_unavailable_reason();
    let ai_ready = ai_reason.is_none();

    Json(HealthResponse {
        status: if ai_ready && database_ok { "healthy" } else { "degraded" },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: APP_VERSION,
        services: HealthServices {
            llm_index: if ai_ready { "ready" } else { "not_ready" },
            database: if database_ok { "connected" } else { "error" },
            api: "ready",
        },
        ai_unavailable_reason: ai_reason,
    })
}

/// Settings with secrets omitted.
pub async fn debug_config(State(ctx): State<ApiContext>) -> Json<Settings> {
    Json(ctx.core.settings.clone())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::endpoints::test_helpers::*;
    use crate::pipeline::rag::MockLlmClient;
    use crate::test_support::{offline_core, ready_core};

    #[tokio::test]
    async fn banner_and_info() {
        let (_dir, core) = offline_core();
        let (status, json) = send(app(&core), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "EHR AI Services API");
        assert_eq!(json["api_v1"], "/api/v1");

        let (_, json) = send(app(&core), get("/info")).await;
        assert_eq!(json["environment"], "development");
        assert!(json["supported_formats"].as_array().unwrap().contains(&serde_json::json!(".pdf")));
    }

    #[tokio::test]
    async fn health_is_degraded_without_ai() {
        let (_dir, core) = offline_core();
        let (status, json) = send(app(&core), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["services"]["llm_index"], "not_ready");
        assert_eq!(json["services"]["database"], "connected");
    }

    #[tokio::test]
    async fn health_is_healthy_with_ai() {
        let (_dir, core) = ready_core(MockLlmClient::new("ok"));
        let (_, json) = send(app(&core), get("/health")).await;
        assert_eq!(json["status"], "healthy");
        assert!(json.get("ai_unavailable_reason").is_none());
    }

    #[tokio::test]
    async fn debug_config_only_in_debug_mode() {
        let (_dir, core) = offline_core();
        let (status, _) = send(app(&core), get("/debug/config")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let dir = tempfile::tempdir().unwrap();
        let mut settings = crate::config::Settings::with_data_dir(dir.path()).unwrap();
        settings.debug = true;
        settings.llm_api_key = Some("sk-hidden".into());
        let core = std::sync::Arc::new(crate::core_state::CoreState::new(settings));
        let (status, json) = send(app(&core), get("/debug/config")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["llm_model"], "gpt-4o-mini");
        assert!(!json.to_string().contains("sk-hidden"));
    }
}

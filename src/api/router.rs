//! HTTP router.
//!
//! Resource and AI routes are nested under `/api/v1`; service routes
//! (`/`, `/info`, `/health`, and `/debug/config` in debug mode) are unprefixed.
//!
//! Middleware stack (outermost → innermost):
//! CORS → body limit → request timing → debug error details (debug only)

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::{Settings, API_V1_STR};
use crate::core_state::CoreState;

/// Headroom over `MAX_FILE_SIZE` for the other multipart fields.
const BODY_LIMIT_MARGIN: usize = 1024 * 1024;

/// Build the full application router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    let settings = ctx.core.settings.clone();

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let v1 = Router::new()
        .route(
            "/facilities",
            post(endpoints::facilities::create).get(endpoints::facilities::list),
        )
        .route(
            "/facilities/external/:external_id",
            get(endpoints::facilities::by_external_id),
        )
        .route(
            "/facilities/:id",
            get(endpoints::facilities::detail).delete(endpoints::facilities::remove),
        )
        .route(
            "/patient-identifiers",
            post(endpoints::patients::create).get(endpoints::patients::list),
        )
        .route(
            "/patient-identifiers/:code",
            get(endpoints::patients::detail).delete(endpoints::patients::remove),
        )
        .route(
            "/medical-documents",
            post(endpoints::documents::create).get(endpoints::documents::list),
        )
        .route("/medical-documents/upload", post(endpoints::documents::upload))
        .route(
            "/medical-documents/:id",
            get(endpoints::documents::detail).delete(endpoints::documents::remove),
        )
        .route(
            "/medical-documents/:id/process",
            post(endpoints::documents::process),
        )
        .route("/query", post(endpoints::query::query))
        .route("/query/health", get(endpoints::query::health))
        .route(
            "/query-patient-data",
            post(endpoints::query::query_patient_data),
        )
        .route("/clinical", post(endpoints::clinical::clinical_query))
        .route("/suggest/codes", post(endpoints::coding::suggest_codes))
        .route(
            "/generate/discharge-instructions",
            post(endpoints::discharge::generate_discharge_instructions),
        )
        .route("/analyze/results", post(endpoints::analysis::analyze_results))
        .route(
            "/patient/:code/summary",
            get(endpoints::summary::patient_summary),
        );

    let mut service = Router::new()
        .route("/", get(endpoints::root::banner))
        .route("/info", get(endpoints::root::info))
        .route("/health", get(endpoints::root::health));
    if settings.debug {
        service = service.route("/debug/config", get(endpoints::root::debug_config));
    }

    let mut app = service.nest(API_V1_STR, v1).with_state(ctx);

    // Layers are applied from innermost to outermost.
    if settings.debug {
        app = app.layer(axum::middleware::from_fn(
            middleware::debug::expose_internal_errors,
        ));
    }
    app.layer(axum::middleware::from_fn(middleware::timing::log_request))
        .layer(DefaultBodyLimit::max(body_limit(&settings)))
        .layer(cors_layer(&settings))
}

fn body_limit(settings: &Settings) -> usize {
    usize::try_from(settings.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_MARGIN)
}

/// `*` allows any origin; otherwise only the listed origins. Entries that are
/// not valid header values are logged and skipped.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = &settings.allowed_origins;
    let allow_origin = if origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::middleware::timing::PROCESS_TIME_HEADER;
    use crate::test_support::offline_core;

    fn core_with_origins(origins: &[&str]) -> (tempfile::TempDir, Arc<CoreState>) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path()).unwrap();
        settings.allowed_origins = origins.iter().map(|o| o.to_string()).collect();
        (dir, Arc::new(CoreState::new(settings)))
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (_dir, core) = offline_core();
        let resp = api_router(core)
            .oneshot(Request::builder().uri("/api/v1/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn every_response_carries_process_time() {
        let (_dir, core) = offline_core();
        let resp = api_router(core)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let value = resp.headers().get(PROCESS_TIME_HEADER).unwrap().to_str().unwrap();
        assert!(value.parse::<f64>().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_only() {
        let (_dir, core) = core_with_origins(&["https://ehr.example.org"]);
        let app = api_router(core);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://ehr.example.org")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").unwrap(),
            "https://ehr.example.org"
        );

        let denied = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn wildcard_origin_allows_any() {
        let (_dir, core) = core_with_origins(&["*"]);
        let resp = api_router(core)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("origin", "https://anywhere.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[test]
    fn body_limit_leaves_room_for_form_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path()).unwrap();
        settings.max_file_size = 10;
        assert_eq!(body_limit(&settings), 10 + BODY_LIMIT_MARGIN);
    }
}

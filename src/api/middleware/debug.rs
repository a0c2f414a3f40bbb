//! Debug-mode error exposure.
//!
//! `ApiError::Internal` renders a generic message and attaches the cause as an
//! `InternalErrorDetail` extension. When this layer is mounted the cause
//! replaces the generic message in the `{"detail"}` body.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::error::{ErrorBody, InternalErrorDetail};

pub async fn expose_internal_errors(req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(InternalErrorDetail(cause)) = response.extensions().get::<InternalErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Json(ErrorBody { detail: cause }).into_response().into_body();
    Response::from_parts(parts, body)
}

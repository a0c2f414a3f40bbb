//! Request logging and timing.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Log method, path, status and latency; report the latency in seconds
/// in `X-Process-Time`.
pub async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    if response.status().is_server_error() {
        tracing::warn!(%method, %path, status, latency_ms = elapsed.as_millis() as u64, "Request completed");
    } else {
        tracing::info!(%method, %path, status, latency_ms = elapsed.as_millis() as u64, "Request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

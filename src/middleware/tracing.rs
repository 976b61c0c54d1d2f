//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Wrap each request in a span carrying a fresh request id and log its outcome
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4();

    let span = tracing::info_span!("request", %request_id, %method, %path);
    let start = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    span.in_scope(|| {
        if response.status().is_server_error() {
            tracing::error!(status, duration_ms, "request failed");
        } else if response.status().is_client_error() {
            tracing::warn!(status, duration_ms, "request rejected");
        } else {
            tracing::info!(status, duration_ms, "request completed");
        }
    });

    response
}

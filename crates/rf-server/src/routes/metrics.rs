//! Prometheus metrics endpoint.

use axum::http::header;
use axum::response::IntoResponse;

use crate::telemetry;

/// GET /metrics -- Prometheus-format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        telemetry::render(),
    )
}

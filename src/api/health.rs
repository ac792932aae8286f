//! Liveness probe endpoint.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// `GET /healthz`: always returns 200 OK with `{"status": "ok"}`.
///
/// No dependencies, never blocks; safe as a Docker / Kubernetes liveness
/// probe.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

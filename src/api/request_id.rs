//! Request ID middleware.
//!
//! Every inbound request gets an `X-Request-ID`: taken from the caller when
//! present, freshly generated otherwise, stored as an axum [`Extension`] for
//! handlers, echoed back in the response, and attached to a [`tracing`] span
//! so server logs and client responses share one identifier.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument as _;
use uuid::Uuid;

/// Newtype wrapper carrying the assigned request ID.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Assign a [`RequestId`] to every request.
///
/// Layer order matters: apply this middleware inside the
/// `tower_http::TraceLayer` so it runs within the trace span.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::debug_span!("request_id", id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}

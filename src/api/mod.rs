//! HTTP surface: route table, middleware stack, and actor resolution.
//!
//! Handlers are a thin layer: they translate HTTP concerns (paths, query
//! strings, headers, status codes) into calls on [`AppState`] and back. All
//! pipeline logic lives in [`crate::ingest`], [`crate::store`], and friends.

pub mod comments;
pub mod feedback;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod request_id;
pub mod tickets;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::domain::User;
use crate::error::AppError;
use crate::ingest::AppState;

/// Build the public API router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_allow_any = state.config.server.cors_allow_any;

    let mut router = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/tickets/create", post(tickets::create))
        .route("/tickets", get(tickets::list))
        .route("/tickets/search", get(tickets::search))
        .route("/tickets/overdue", get(tickets::overdue))
        .route(
            "/tickets/{id}",
            get(tickets::get_one).put(tickets::update).delete(tickets::soft_close),
        )
        .route("/tickets/{id}/comments", post(comments::create).get(comments::list))
        .route("/tickets/{id}/feedback", post(feedback::create).get(feedback::get_one))
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread/count", get(notifications::unread_count))
        .route("/notifications/{id}/read", put(notifications::mark_read))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/metrics", get(metrics::dashboard))
        .with_state(state)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        );

    // The dashboard frontend is served from another origin in every known
    // deployment.
    if cors_allow_any {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Resolve the acting user from the `X-Actor-Id` header.
///
/// Token resolution belongs to the external auth service; by the time a
/// request reaches the core it carries (at most) the resolved user id. A
/// missing header means a system actor; an unknown id resolves to `None`
/// rather than failing the request.
pub(crate) async fn actor_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<User>, AppError> {
    let Some(raw) = headers.get("x-actor-id").and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let id = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidInput(format!("invalid X-Actor-Id: {raw}")))?;
    state.store.user(id).await
}

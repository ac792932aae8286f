//! Notification endpoints.
//!
//! Until the auth service is wired in front of the core, the recipient is
//! identified by an explicit `user_id` query parameter, mirroring the rest
//! of the unauthenticated surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::Notification;
use crate::error::AppError;
use crate::ingest::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Uuid,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct UserParam {
    pub user_id: Uuid,
}

/// `GET /notifications?user-id=`: newest first, optionally unread only.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    ensure_user(&state, params.user_id).await?;
    Ok(Json(
        state
            .store
            .notifications_for(params.user_id, params.unread_only, params.limit.clamp(1, 200))
            .await?,
    ))
}

/// `GET /notifications/unread/count`
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParam>,
) -> Result<Json<Value>, AppError> {
    ensure_user(&state, params.user_id).await?;
    let count = state.store.unread_count(params.user_id).await?;
    Ok(Json(json!({ "count": count })))
}

/// `PUT /notifications/{id}/read`
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserParam>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(state.store.mark_read(id, params.user_id).await?))
}

/// `PUT /notifications/read-all`
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParam>,
) -> Result<Json<Value>, AppError> {
    let updated = state.store.mark_all_read(params.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn ensure_user(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    state
        .store
        .user(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
}

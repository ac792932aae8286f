//! CSAT feedback endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::Feedback;
use crate::error::AppError;
use crate::ingest::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub user_id: Option<Uuid>,
    pub rating: i64,
    pub comment: Option<String>,
}

/// `POST /tickets/{id}/feedback`: one shot per ticket; a second submission
/// returns 409.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<Feedback>, AppError> {
    Ok(Json(
        state
            .store
            .submit_feedback(ticket_id, body.user_id, body.rating, body.comment, Utc::now())
            .await?,
    ))
}

/// `GET /tickets/{id}/feedback`: 404 until feedback exists.
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Feedback>, AppError> {
    state
        .store
        .feedback(ticket_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no feedback for ticket {ticket_id}")))
}

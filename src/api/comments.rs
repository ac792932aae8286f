//! Comment endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::TicketMessage;
use crate::error::AppError;
use crate::ingest::AppState;

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub user_id: Uuid,
    pub text: String,
    /// Opaque JSON, stored verbatim.
    pub attachments: Option<serde_json::Value>,
}

/// `POST /tickets/{id}/comments`: append a comment; history and the
/// role-dependent notification fanout ride in the same transaction.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<CommentBody>,
) -> Result<Json<TicketMessage>, AppError> {
    let now = Utc::now();
    // Unknown senders get a placeholder row, same as anonymous ingestion.
    let author = state.store.upsert_author(body.user_id, now).await?;
    let attachments = body.attachments.map(|v| v.to_string());
    let message = state
        .store
        .add_comment(ticket_id, &author, &body.text, attachments, now)
        .await?;
    Ok(Json(message))
}

/// `GET /tickets/{id}/comments`: oldest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<TicketMessage>>, AppError> {
    Ok(Json(state.store.comments(ticket_id).await?))
}

//! Ticket endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{SlaState, Ticket, TicketStatus};
use crate::error::AppError;
use crate::ingest::{self, AppState, SubmitOutcome, SubmitRequest};
use crate::sla;
use crate::store::tickets::{TicketFilter, TicketPatch};

use super::actor_from_headers;

/// A ticket plus its current SLA bucket, as served to clients.
#[derive(Debug, serde::Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub sla_state: SlaState,
}

impl TicketView {
    fn at(ticket: Ticket, now: chrono::DateTime<Utc>) -> Self {
        let sla_state = sla::sla_state(ticket.status, ticket.sla_deadline, now);
        Self { ticket, sla_state }
    }
}

/// `POST /tickets/create`: ingest a ticket through the full pipeline.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitOutcome>, AppError> {
    Ok(Json(ingest::submit(&state, request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<TicketStatus>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /tickets`: filtered listing, newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let filter = TicketFilter {
        status: params.status,
        category_id: params.category_id,
        category_name: params.category_name,
        date_from: params.date_from.as_deref().map(parse_date_bound_start).transpose()?,
        date_to: params.date_to.as_deref().map(parse_date_bound_end).transpose()?,
        skip: params.skip,
        limit: params.limit.clamp(1, 100),
    };
    Ok(Json(state.store.list_tickets(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// `GET /tickets/search?q=`: substring search over subject and body.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::InvalidInput("search query must not be empty".into()));
    }
    Ok(Json(
        state
            .store
            .search_tickets(&params.q, params.limit.clamp(1, 100), params.offset)
            .await?,
    ))
}

/// `GET /tickets/overdue`: open tickets past their SLA deadline.
pub async fn overdue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(state.store.overdue_tickets(Utc::now()).await?))
}

/// `GET /tickets/{id}`: the row plus its current SLA bucket.
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketView>, AppError> {
    let ticket = state.store.ticket(id).await?;
    Ok(Json(TicketView::at(ticket, Utc::now())))
}

/// `PUT /tickets/{id}`: apply a patch as the `X-Actor-Id` user.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(patch): Json<TicketPatch>,
) -> Result<Json<Ticket>, AppError> {
    let actor = actor_from_headers(&state, &headers).await?;
    Ok(Json(state.store.update_ticket(id, &patch, actor.as_ref(), Utc::now()).await?))
}

/// `DELETE /tickets/{id}`: tickets are never deleted; this is a soft close
/// through the regular update path, history row included.
pub async fn soft_close(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_headers(&state, &headers).await?;
    state
        .store
        .update_ticket(id, &TicketPatch::close(), actor.as_ref(), Utc::now())
        .await?;
    Ok(Json(json!({ "message": "ticket closed", "ticket_id": id })))
}

fn parse_date_bound_start(raw: &str) -> Result<DateTime<Utc>, AppError> {
    parse_date_bound(raw, false)
}

fn parse_date_bound_end(raw: &str) -> Result<DateTime<Utc>, AppError> {
    parse_date_bound(raw, true)
}

/// Accepts RFC 3339 instants or bare `YYYY-MM-DD` dates. Bare dates expand to
/// the start (or end) of that day so `date_to=2025-03-01` includes the whole
/// day.
fn parse_date_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date filter: {raw}")))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.expect("valid wall-clock time").and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_only_bounds_expand_to_day_edges() {
        let start = parse_date_bound("2025-03-01", false).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        let end = parse_date_bound("2025-03-01", true).unwrap();
        assert_eq!(end.to_rfc3339(), "2025-03-01T23:59:59+00:00");
    }

    #[test]
    fn rfc3339_bounds_pass_through() {
        let dt = parse_date_bound("2025-03-01T10:30:00Z", true).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-03-01T10:30:00+00:00");
    }

    #[test]
    fn garbage_dates_are_invalid_input() {
        assert!(matches!(
            parse_date_bound("yesterday", false).unwrap_err(),
            AppError::InvalidInput(_)
        ));
    }
}

//! Dashboard metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::error::AppError;
use crate::ingest::AppState;
use crate::stats::{self, Metrics};

/// `GET /metrics`: aggregate dashboard figures, computed on demand.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Metrics>, AppError> {
    Ok(Json(
        stats::compute(&state.store, &state.config.metrics, Utc::now()).await?,
    ))
}

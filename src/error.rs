//! Unified HTTP error type for axum request handlers.
//!
//! [`AppError`] carries the failure kind the caller needs to branch on:
//! validation problems, missing rows, authorization rejections, uniqueness
//! conflicts, and store outages each map to a distinct HTTP status. Handlers
//! return `Result<T, AppError>` and propagate with `?`: no manual `map_err`.
//!
//! Degraded upstream calls are deliberately NOT an error: the classifier
//! gateway returns an explicit `Outcome::Degraded` variant and the request
//! continues on the fallback path (see [`crate::classifier`]).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Request-scoped failure with a kind the HTTP layer can map to a status.
///
/// `Internal` is the only opaque kind; everything else carries a message safe
/// to show to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or empty input: HTTP 400.
    #[error("{0}")]
    InvalidInput(String),

    /// The referenced row does not exist: HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// The actor is known and not allowed to do this: HTTP 403.
    #[error("{0}")]
    Forbidden(String),

    /// Uniqueness violation (duplicate feedback, duplicate email): HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// The store is unreachable; the transaction was rolled back: HTTP 503.
    #[error("{0}")]
    Unavailable(String),

    /// Anything unexpected. Logged in full, surfaced opaquely: HTTP 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::Unavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "handler error");
        // Internal errors stay opaque; every other kind explains itself.
        let message = match &self {
            AppError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        (
            self.status(),
            Json(json!({ "error": { "kind": self.kind(), "message": message } })),
        )
            .into_response()
    }
}

/// Store failures surface as `Unavailable` with the transaction rolled back;
/// a missing row is `NotFound`; a tripped unique index is `Conflict`.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("duplicate entry".into())
            }
            _ => AppError::Unavailable(format!("store error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        assert_eq!(AppError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn display_keeps_detail_for_the_log_line() {
        let err = AppError::Internal(anyhow::anyhow!("pool timed out"));
        assert!(err.to_string().contains("pool timed out"));
    }
}

//! Daybreak API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use daybreak_core::error::DomainError;
use daybreak_session::SchedulerError;
use daybreak_voting::VoteError;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around the context errors that implements
/// `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Persistence or validation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Vote submission rejected.
    #[error(transparent)]
    Vote(#[from] VoteError),

    /// Session lifecycle request rejected.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

fn domain_status(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::AggregateNotFound(_) => (StatusCode::NOT_FOUND, "aggregate_not_found"),
        DomainError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, "concurrency_conflict"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::Infrastructure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
        }
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Domain(err)
            | Self::Vote(VoteError::Domain(err))
            | Self::Scheduler(SchedulerError::Domain(err)) => domain_status(err),
            Self::Vote(VoteError::UnknownEpisode(_)) => (StatusCode::NOT_FOUND, "unknown_episode"),
            Self::Vote(VoteError::WindowClosed(_)) => (StatusCode::CONFLICT, "window_closed"),
            Self::Vote(VoteError::InvalidChoice { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_choice")
            }
            Self::Vote(VoteError::AlreadyOpen(_)) => (StatusCode::CONFLICT, "window_already_open"),
            Self::Scheduler(SchedulerError::UnknownSession(_)) => {
                (StatusCode::NOT_FOUND, "unknown_session")
            }
            Self::Scheduler(SchedulerError::SessionArchived(_)) => {
                (StatusCode::CONFLICT, "session_archived")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status();

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

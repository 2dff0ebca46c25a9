//! Scheduler error types.

use daybreak_core::error::DomainError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the session scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No session with this id was ever created.
    #[error("unknown session: {0}")]
    UnknownSession(Uuid),

    /// The session has ended; no further episodes start.
    #[error("session {0} is archived")]
    SessionArchived(Uuid),

    /// Persistence or validation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

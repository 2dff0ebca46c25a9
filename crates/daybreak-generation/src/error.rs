//! Errors reported by generation services.

use thiserror::Error;

/// A failed call to a generation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Worth retrying: timeouts, rate limits, unavailable upstreams.
    #[error("transient service error: {0}")]
    Transient(String),

    /// Retrying will not help: rejected input, unsupported kind, bad output.
    #[error("permanent service error: {0}")]
    Permanent(String),
}

impl ServiceError {
    /// Whether the dispatcher may retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

//! Episode errors.

use daybreak_core::error::DomainError;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::state::EpisodeState;

/// Errors from driving an episode.
#[derive(Debug, Error)]
pub enum EpisodeError {
    /// The transition is not in the state table.
    #[error("invalid episode transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: EpisodeState,
        /// Requested state.
        to: EpisodeState,
    },

    /// The episode is `Completed`, `Failed` or `Aborted` and is immutable.
    #[error("episode {0} is terminal")]
    Terminal(Uuid),

    /// Persistence or validation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

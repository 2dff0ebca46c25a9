//! Errors returned to vote submitters and to the episode state machine.

use daybreak_core::error::DomainError;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the vote aggregator. `UnknownEpisode`, `WindowClosed` and
/// `InvalidChoice` are rejections of a client request, not failures of the
/// orchestrator.
#[derive(Debug, Error)]
pub enum VoteError {
    /// No vote window was ever opened for the episode.
    #[error("unknown episode: {0}")]
    UnknownEpisode(Uuid),

    /// The episode's window has closed (or was released).
    #[error("vote window closed for episode {0}")]
    WindowClosed(Uuid),

    /// The choice is not one of the options offered.
    #[error("invalid choice {choice:?} for episode {episode_id}")]
    InvalidChoice {
        /// The episode voted on.
        episode_id: Uuid,
        /// The rejected choice.
        choice: String,
    },

    /// A window already exists for the episode.
    #[error("vote window already open for episode {0}")]
    AlreadyOpen(Uuid),

    /// Persistence or validation failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

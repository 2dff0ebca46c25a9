//! Daybreak — Episode bounded context.
//!
//! One episode is one day of the game: narrative generation, a vote window,
//! outcome resolution against the world state, media generation and
//! publication. The `Episode` aggregate enforces the state machine; the
//! `EpisodeRunner` drives it against the other contexts.

pub mod application;
pub mod domain;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use application::publisher::{
    FailureNotice, PublishError, Publisher, ResultNotice, VoteOpenNotice,
};
pub use application::runner::{
    EpisodeConfig, EpisodeContext, EpisodeReport, EpisodeRunner, NpcDescriptor,
};
pub use domain::aggregates::Episode;
pub use domain::outcome::{NpcLine, Outcome, PublishedAsset};
pub use domain::state::EpisodeState;
pub use error::EpisodeError;

//! The outbound notification port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daybreak_generation::{Choice, JobKind};
use daybreak_voting::Tally;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::outcome::{NpcLine, Outcome, PublishedAsset};
use crate::domain::state::EpisodeState;

/// The transport refused or failed to deliver a notification.
#[derive(Debug, Clone, Error)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Published when voting opens.
#[derive(Debug, Clone, Serialize)]
pub struct VoteOpenNotice {
    /// The session.
    pub session_id: Uuid,
    /// The episode to vote on.
    pub episode_id: Uuid,
    /// Day number.
    pub day: u64,
    /// The story text.
    pub narrative: String,
    /// The choices on offer.
    pub choices: Vec<Choice>,
    /// Character lines.
    pub npc_lines: Vec<NpcLine>,
    /// When voting closes.
    pub closes_at: DateTime<Utc>,
}

/// Published when an episode completes.
#[derive(Debug, Clone, Serialize)]
pub struct ResultNotice {
    /// The session.
    pub session_id: Uuid,
    /// The episode.
    pub episode_id: Uuid,
    /// Day number.
    pub day: u64,
    /// The resolved outcome.
    pub outcome: Outcome,
    /// The tally behind it.
    pub tally: Tally,
    /// Generated assets.
    pub assets: Vec<PublishedAsset>,
    /// Content kinds that are missing from this result.
    pub missing: Vec<JobKind>,
    /// Tomorrow's teaser.
    pub teaser: Option<String>,
}

/// Published when an episode fails.
#[derive(Debug, Clone, Serialize)]
pub struct FailureNotice {
    /// The session.
    pub session_id: Uuid,
    /// The episode.
    pub episode_id: Uuid,
    /// Day number.
    pub day: u64,
    /// The state the episode failed in.
    pub state: EpisodeState,
    /// What went wrong.
    pub reason: String,
}

/// Chat/notification transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Announces the narrative and opens voting to the players.
    async fn publish_vote_open(&self, notice: &VoteOpenNotice) -> Result<(), PublishError>;

    /// Announces the day's result.
    async fn publish_result(&self, notice: &ResultNotice) -> Result<(), PublishError>;

    /// Announces that the day's episode failed.
    async fn publish_failure(&self, notice: &FailureNotice) -> Result<(), PublishError>;
}

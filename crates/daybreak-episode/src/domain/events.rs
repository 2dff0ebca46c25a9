//! Domain events for the Episode context.

use chrono::{DateTime, Utc};
use daybreak_core::event::{DomainEvent, EventMetadata};
use daybreak_generation::{Choice, ContentJob, JobKind};
use daybreak_voting::Tally;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::outcome::{NpcLine, Outcome, PublishedAsset};
use super::state::EpisodeState;

/// Emitted when the scheduler creates the episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeScheduled {
    /// The episode.
    pub episode_id: Uuid,
    /// The owning session.
    pub session_id: Uuid,
    /// Day number within the session.
    pub sequence: u64,
    /// World version read at episode start.
    pub world_version: i64,
}

/// Emitted when narrative (and NPC) jobs are dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeRequested {
    /// Dispatched job ids.
    pub job_ids: Vec<Uuid>,
}

/// Emitted when the narrative is ready and the vote window opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOpened {
    /// The story text.
    pub narrative: String,
    /// The choices on offer.
    pub choices: Vec<Choice>,
    /// Character lines published with the story.
    pub npc_lines: Vec<NpcLine>,
    /// Final records of the narrative and NPC jobs.
    pub jobs: Vec<ContentJob>,
    /// The ballot box stream holding the votes.
    pub ballot_box_id: Uuid,
    /// When the window opened.
    pub opened_at: DateTime<Utc>,
    /// When the window closes.
    pub closes_at: DateTime<Utc>,
}

/// Emitted when the vote window was resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteClosed {
    /// The resolved tally.
    pub tally: Tally,
    /// When the window was closed.
    pub closed_at: DateTime<Utc>,
}

/// Emitted when the outcome was committed to the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeResolved {
    /// The resolved outcome.
    pub outcome: Outcome,
    /// World version produced by the commit.
    pub world_version: i64,
}

/// Emitted when the content jobs were joined and committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSettled {
    /// Final records of the media and teaser jobs.
    pub jobs: Vec<ContentJob>,
    /// Successfully generated assets.
    pub assets: Vec<PublishedAsset>,
    /// Kinds that produced nothing.
    pub missing: Vec<JobKind>,
    /// Tomorrow's teaser.
    pub teaser: Option<String>,
    /// World version produced by the content commit; `None` when the
    /// commit failed and the content is missing from world history.
    pub world_version: Option<i64>,
}

/// Emitted when the result was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeCompleted {
    /// When publication finished.
    pub completed_at: DateTime<Utc>,
}

/// Emitted on an unrecoverable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeFailed {
    /// The state the episode failed in.
    pub from: EpisodeState,
    /// What went wrong.
    pub reason: String,
}

/// Emitted on explicit cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeAborted {
    /// The state the episode was aborted in.
    pub from: EpisodeState,
    /// Why it was aborted.
    pub reason: String,
}

/// Event payload variants for the Episode context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EpisodeEventKind {
    /// The episode was scheduled.
    EpisodeScheduled(EpisodeScheduled),
    /// Narrative jobs were dispatched.
    NarrativeRequested(NarrativeRequested),
    /// The vote window opened.
    VoteOpened(VoteOpened),
    /// The vote window was resolved.
    VoteClosed(VoteClosed),
    /// The outcome was committed.
    OutcomeResolved(OutcomeResolved),
    /// Content jobs settled.
    ContentSettled(ContentSettled),
    /// The episode completed.
    EpisodeCompleted(EpisodeCompleted),
    /// The episode failed.
    EpisodeFailed(EpisodeFailed),
    /// The episode was aborted.
    EpisodeAborted(EpisodeAborted),
}

impl EpisodeEventKind {
    /// The stored event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EpisodeScheduled(_) => "episode.scheduled",
            Self::NarrativeRequested(_) => "episode.narrative_requested",
            Self::VoteOpened(_) => "episode.vote_opened",
            Self::VoteClosed(_) => "episode.vote_closed",
            Self::OutcomeResolved(_) => "episode.outcome_resolved",
            Self::ContentSettled(_) => "episode.content_settled",
            Self::EpisodeCompleted(_) => "episode.completed",
            Self::EpisodeFailed(_) => "episode.failed",
            Self::EpisodeAborted(_) => "episode.aborted",
        }
    }
}

/// Domain event envelope for the Episode context.
#[derive(Debug, Clone)]
pub struct EpisodeEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: EpisodeEventKind,
}

impl DomainEvent for EpisodeEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("EpisodeEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

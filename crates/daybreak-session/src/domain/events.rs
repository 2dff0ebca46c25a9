//! Domain events for the Session context.

use chrono::{DateTime, Utc};
use daybreak_core::event::{DomainEvent, EventMetadata};
use daybreak_episode::EpisodeState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::character::Character;

/// Emitted when a session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    /// The session identifier.
    pub session_id: Uuid,
    /// The setting fed to narrative generation.
    pub setting: String,
    /// Crew member names.
    pub crew: Vec<String>,
}

/// Emitted when a character joins the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterAdded {
    /// The new character.
    pub character: Character,
}

/// Emitted when the scheduler starts an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeStarted {
    /// The new episode.
    pub episode_id: Uuid,
    /// Day number; previous + 1.
    pub sequence: u64,
}

/// Emitted when a started episode reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeFinished {
    /// The episode.
    pub episode_id: Uuid,
    /// Its day number.
    pub sequence: u64,
    /// Its terminal state.
    pub state: EpisodeState,
}

/// Emitted when the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArchived {
    /// When the session ended.
    pub archived_at: DateTime<Utc>,
}

/// Event type identifier for [`SessionCreated`].
pub const SESSION_CREATED_EVENT_TYPE: &str = "session.created";

/// Event type identifier for [`CharacterAdded`].
pub const CHARACTER_ADDED_EVENT_TYPE: &str = "session.character_added";

/// Event type identifier for [`EpisodeStarted`].
pub const EPISODE_STARTED_EVENT_TYPE: &str = "session.episode_started";

/// Event type identifier for [`EpisodeFinished`].
pub const EPISODE_FINISHED_EVENT_TYPE: &str = "session.episode_finished";

/// Event type identifier for [`SessionArchived`].
pub const SESSION_ARCHIVED_EVENT_TYPE: &str = "session.archived";

/// Event payload variants for the Session context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEventKind {
    /// A session was created.
    SessionCreated(SessionCreated),
    /// A character joined.
    CharacterAdded(CharacterAdded),
    /// An episode started.
    EpisodeStarted(EpisodeStarted),
    /// An episode finished.
    EpisodeFinished(EpisodeFinished),
    /// The session ended.
    SessionArchived(SessionArchived),
}

impl SessionEventKind {
    /// The stored event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionCreated(_) => SESSION_CREATED_EVENT_TYPE,
            Self::CharacterAdded(_) => CHARACTER_ADDED_EVENT_TYPE,
            Self::EpisodeStarted(_) => EPISODE_STARTED_EVENT_TYPE,
            Self::EpisodeFinished(_) => EPISODE_FINISHED_EVENT_TYPE,
            Self::SessionArchived(_) => SESSION_ARCHIVED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the Session context.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: SessionEventKind,
}

impl DomainEvent for SessionEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("SessionEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

//! Job requests and outputs exchanged with generation services.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobKind;

/// A choice offered to the players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Key players vote with.
    pub key: String,
    /// Human-readable label.
    pub label: String,
    /// Structured world effects proposed by the generator for this choice.
    /// Opaque here; the episode runner decides how to apply them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<serde_json::Value>,
}

impl Choice {
    /// Creates a choice without effects.
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            effects: None,
        }
    }

    /// Attaches proposed world effects.
    #[must_use]
    pub fn with_effects(mut self, effects: serde_json::Value) -> Self {
        self.effects = Some(effects);
        self
    }
}

/// Input for the narrative generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeRequest {
    /// The session's setting.
    pub setting: String,
    /// Summaries of the most recent history entries, oldest first.
    pub history: Vec<String>,
    /// Current world snapshot.
    pub world: serde_json::Value,
    /// Day number of the episode.
    pub day: u64,
}

/// A narrative generator's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeDraft {
    /// The story text.
    pub narrative: String,
    /// The choices to vote on.
    pub choices: Vec<Choice>,
}

/// Input for the NPC behavior service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcRequest {
    /// The character reacting.
    pub character_id: Uuid,
    /// Display name of the character.
    pub name: String,
    /// Opaque personality descriptor, passed through untouched.
    pub personality: serde_json::Value,
    /// Current world snapshot.
    pub world: serde_json::Value,
    /// Recent history summaries.
    pub recent_events: Vec<String>,
}

/// Input for the media generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRequest {
    /// One of the media kinds.
    pub kind: JobKind,
    /// Generation prompt derived from the narrative and outcome.
    pub prompt: String,
}

/// Input for tomorrow's teaser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeaserRequest {
    /// The session's setting.
    pub setting: String,
    /// Summary of today's outcome.
    pub outcome: String,
}

/// Kind-specific job input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Story generation.
    Narrative(NarrativeRequest),
    /// Character reaction.
    NpcReaction(NpcRequest),
    /// Media asset.
    Media(MediaRequest),
    /// Tomorrow's teaser.
    Teaser(TeaserRequest),
}

impl JobPayload {
    /// The job kind this payload produces.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Narrative(_) => JobKind::Narrative,
            Self::NpcReaction(_) => JobKind::NpcReaction,
            Self::Media(media) => media.kind,
            Self::Teaser(_) => JobKind::Teaser,
        }
    }
}

/// A job submitted to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job identifier.
    pub job_id: Uuid,
    /// The episode the job belongs to.
    pub episode_id: Uuid,
    /// Kind-specific input.
    pub payload: JobPayload,
    /// Bound on the whole job, retries included.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl JobRequest {
    /// Creates a request with a fresh job id.
    #[must_use]
    pub fn new(episode_id: Uuid, payload: JobPayload, timeout: Duration) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            episode_id,
            payload,
            timeout,
        }
    }

    /// The job kind.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutput {
    /// Story and choices.
    Narrative(NarrativeDraft),
    /// A character's reaction line.
    Reaction {
        /// The reacting character.
        character_id: Uuid,
        /// Reaction text or action.
        text: String,
    },
    /// Opaque handle of a generated media asset.
    Asset {
        /// Asset handle as returned by the media service.
        handle: String,
    },
    /// Teaser text.
    Teaser {
        /// The teaser.
        text: String,
    },
}

impl JobOutput {
    /// Whether this output is what a job of `kind` should produce.
    #[must_use]
    pub fn fits(&self, kind: JobKind) -> bool {
        match self {
            Self::Narrative(_) => kind == JobKind::Narrative,
            Self::Reaction { .. } => kind == JobKind::NpcReaction,
            Self::Asset { .. } => kind.is_media(),
            Self::Teaser { .. } => kind == JobKind::Teaser,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

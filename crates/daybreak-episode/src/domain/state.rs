//! The episode state machine's states and transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an episode is in its daily cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeState {
    /// Scheduled, nothing dispatched yet.
    Idle,
    /// Waiting for the narrative (and NPC reactions).
    NarrativePending,
    /// Players are voting.
    VoteOpen,
    /// The tally is being applied to the world.
    Resolving,
    /// Waiting for media and teaser jobs.
    ContentPending,
    /// Publishing the result.
    Publishing,
    /// Published; immutable.
    Completed,
    /// Ended on an unrecoverable error; immutable.
    Failed,
    /// Cancelled before resolution; immutable.
    Aborted,
}

impl EpisodeState {
    /// Whether the episode has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Whether an explicit cancellation is still honoured.
    #[must_use]
    pub fn is_abortable(self) -> bool {
        matches!(self, Self::Idle | Self::NarrativePending | Self::VoteOpen)
    }

    /// Whether `self → next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use EpisodeState::{
            Aborted, Completed, ContentPending, Failed, Idle, NarrativePending, Publishing,
            Resolving, VoteOpen,
        };
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed => true,
            Aborted => self.is_abortable(),
            _ => matches!(
                (self, next),
                (Idle, NarrativePending)
                    | (NarrativePending, VoteOpen)
                    | (VoteOpen, Resolving)
                    | (Resolving, ContentPending)
                    | (ContentPending, Publishing)
                    | (Publishing, Completed)
            ),
        }
    }

    /// Stable name used in logs and payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NarrativePending => "narrative_pending",
            Self::VoteOpen => "vote_open",
            Self::Resolving => "resolving",
            Self::ContentPending => "content_pending",
            Self::Publishing => "publishing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

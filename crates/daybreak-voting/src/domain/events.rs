//! Domain events for the Vote Aggregation context.

use chrono::{DateTime, Utc};
use daybreak_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tally::Tally;

/// Emitted when a vote window opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowOpened {
    /// The ballot box stream.
    pub ballot_box_id: Uuid,
    /// The episode voted on.
    pub episode_id: Uuid,
    /// Valid choice keys. Empty accepts any choice.
    pub choices: Vec<String>,
    /// When the window opened.
    pub opened_at: DateTime<Utc>,
    /// When the window stops accepting votes.
    pub closes_at: DateTime<Utc>,
}

/// Emitted for every accepted vote, before it is counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteCast {
    /// The voting player.
    pub player_id: String,
    /// The chosen option key.
    pub choice: String,
    /// When the vote was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Arrival order within the window.
    pub arrival: u64,
}

/// Emitted once when the window is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowClosed {
    /// The resolved tally.
    pub tally: Tally,
}

/// Emitted when a window is dropped without a tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowReleased {
    /// When the window was dropped.
    pub released_at: DateTime<Utc>,
}

/// Event payload variants for the Vote Aggregation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BallotBoxEventKind {
    /// A window opened.
    WindowOpened(WindowOpened),
    /// A vote was accepted.
    VoteCast(VoteCast),
    /// The window was resolved.
    WindowClosed(WindowClosed),
    /// The window was released.
    WindowReleased(WindowReleased),
}

/// Domain event envelope for the Vote Aggregation context.
#[derive(Debug, Clone)]
pub struct BallotBoxEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: BallotBoxEventKind,
}

impl DomainEvent for BallotBoxEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            BallotBoxEventKind::WindowOpened(_) => "vote.window_opened",
            BallotBoxEventKind::VoteCast(_) => "vote.cast",
            BallotBoxEventKind::WindowClosed(_) => "vote.window_closed",
            BallotBoxEventKind::WindowReleased(_) => "vote.window_released",
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("BallotBoxEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

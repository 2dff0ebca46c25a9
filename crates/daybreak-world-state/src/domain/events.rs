//! Domain events for the World State context.

use daybreak_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mutation::{HistoryEntry, WorldEffects, WorldSeed};

/// Emitted once when a session's world is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSeeded {
    /// The session owning this world.
    pub session_id: Uuid,
    /// The starting state.
    pub seed: WorldSeed,
    /// The genesis history entry.
    pub entry: HistoryEntry,
}

/// Emitted for every committed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationCommitted {
    /// The session owning this world.
    pub session_id: Uuid,
    /// The history entry appended by this commit.
    pub entry: HistoryEntry,
    /// The structured effects applied.
    pub effects: WorldEffects,
}

/// Event payload variants for the World State context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorldStateEventKind {
    /// The world was seeded.
    WorldSeeded(WorldSeeded),
    /// A mutation was committed.
    MutationCommitted(MutationCommitted),
}

/// Domain event envelope for the World State context.
#[derive(Debug, Clone)]
pub struct WorldStateEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: WorldStateEventKind,
}

impl DomainEvent for WorldStateEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            WorldStateEventKind::WorldSeeded(_) => "world_state.seeded",
            WorldStateEventKind::MutationCommitted(_) => "world_state.mutation_committed",
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("WorldStateEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

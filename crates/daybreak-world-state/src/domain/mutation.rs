//! Value types describing changes to a world.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directed relationship between two crew members or characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity.
    pub from: String,
    /// Target entity.
    pub to: String,
    /// Signed affinity; positive is friendly.
    pub affinity: i32,
}

/// A change in affinity between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipChange {
    /// Source entity.
    pub from: String,
    /// Target entity.
    pub to: String,
    /// Amount added to the current affinity.
    pub delta: i32,
}

/// Structured effects of a resolved outcome, applied together with its
/// history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldEffects {
    /// New status text per crew member (replaces the previous status).
    #[serde(default)]
    pub crew_updates: BTreeMap<String, String>,
    /// Amounts added to resources; missing resources start at zero.
    #[serde(default)]
    pub resource_deltas: BTreeMap<String, i64>,
    /// Affinity changes; missing links are created.
    #[serde(default)]
    pub relationship_changes: Vec<RelationshipChange>,
}

impl WorldEffects {
    /// Returns `true` if applying these effects changes nothing but history.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.crew_updates.is_empty()
            && self.resource_deltas.is_empty()
            && self.relationship_changes.is_empty()
    }
}

/// Which point of the daily cycle produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// The world's starting state.
    Genesis,
    /// The resolved vote outcome of an episode.
    Outcome,
    /// The content produced for an episode.
    Content,
}

/// One entry in the append-only world history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The world version this entry produced.
    pub version: i64,
    /// The episode that committed it (absent for genesis).
    pub episode_id: Option<Uuid>,
    /// The episode's sequence number within the session.
    pub episode_sequence: Option<u64>,
    /// Commit point.
    pub kind: HistoryKind,
    /// Human-readable summary, fed back into narrative prompts.
    pub summary: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// A change an episode wants to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMutation {
    /// The committing episode.
    pub episode_id: Uuid,
    /// The committing episode's sequence number.
    pub episode_sequence: u64,
    /// Commit point (`Outcome` or `Content`).
    pub kind: HistoryKind,
    /// History summary.
    pub summary: String,
    /// Structured effects.
    pub effects: WorldEffects,
}

impl WorldMutation {
    /// Creates a mutation with no structured effects.
    #[must_use]
    pub fn new(
        episode_id: Uuid,
        episode_sequence: u64,
        kind: HistoryKind,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            episode_id,
            episode_sequence,
            kind,
            summary: summary.into(),
            effects: WorldEffects::default(),
        }
    }

    /// Attaches structured effects.
    #[must_use]
    pub fn with_effects(mut self, effects: WorldEffects) -> Self {
        self.effects = effects;
        self
    }
}

/// The starting state of a session's world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSeed {
    /// Initial crew statuses.
    #[serde(default)]
    pub crew: BTreeMap<String, String>,
    /// Initial resource amounts.
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
    /// Initial relationships.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

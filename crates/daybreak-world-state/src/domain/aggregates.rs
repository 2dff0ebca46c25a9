//! Aggregate roots for the World State context.

use std::collections::BTreeMap;

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::event::EventMetadata;
use serde::Serialize;
use uuid::Uuid;

use super::events::{MutationCommitted, WorldSeeded, WorldStateEvent, WorldStateEventKind};
use super::mutation::{
    HistoryEntry, HistoryKind, Relationship, WorldEffects, WorldMutation, WorldSeed,
};

/// The canonical world of one session.
#[derive(Debug, Clone, Serialize)]
pub struct WorldState {
    /// The owning session; also the aggregate identifier.
    pub session_id: Uuid,
    /// Current version (event count). Zero means never seeded or committed.
    pub(crate) version: i64,
    /// Status per crew member.
    pub crew: BTreeMap<String, String>,
    /// Resource amounts.
    pub resources: BTreeMap<String, i64>,
    /// Relationships between entities.
    pub relationships: Vec<Relationship>,
    /// Append-only history, oldest first.
    pub history: Vec<HistoryEntry>,
    /// Uncommitted events pending persistence.
    #[serde(skip)]
    uncommitted_events: Vec<WorldStateEvent>,
}

impl WorldState {
    /// Creates an empty world at version 0.
    #[must_use]
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            version: 0,
            crew: BTreeMap::new(),
            resources: BTreeMap::new(),
            relationships: Vec::new(),
            history: Vec::new(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Returns the last `n` history entries, oldest first.
    #[must_use]
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Returns the affinity between two entities, if linked.
    #[must_use]
    pub fn affinity(&self, from: &str, to: &str) -> Option<i32> {
        self.relationships
            .iter()
            .find(|r| r.from == from && r.to == to)
            .map(|r| r.affinity)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    /// Seeds the world with its starting state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the world already has
    /// history: seeding is only valid at version 0.
    pub fn seed(
        &mut self,
        seed: WorldSeed,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.version != 0 || !self.uncommitted_events.is_empty() {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: self.session_id,
                expected: 0,
                actual: self.version,
            });
        }
        let sequence_number = self.next_sequence_number();
        let metadata = EventMetadata::new(
            "world_state.seeded",
            self.session_id,
            sequence_number,
            correlation_id,
            clock,
        );
        let entry = HistoryEntry {
            version: sequence_number,
            episode_id: None,
            episode_sequence: None,
            kind: HistoryKind::Genesis,
            summary: "The voyage begins.".to_owned(),
            recorded_at: metadata.occurred_at,
        };
        self.uncommitted_events.push(WorldStateEvent {
            metadata,
            kind: WorldStateEventKind::WorldSeeded(WorldSeeded {
                session_id: self.session_id,
                seed,
                entry,
            }),
        });
        Ok(())
    }

    /// Records a mutation on top of the current version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an empty summary or a genesis
    /// mutation, which only `seed` may produce.
    pub fn commit_mutation(
        &mut self,
        mutation: WorldMutation,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if mutation.summary.trim().is_empty() {
            return Err(DomainError::Validation(
                "mutation summary must not be empty".into(),
            ));
        }
        if mutation.kind == HistoryKind::Genesis {
            return Err(DomainError::Validation(
                "genesis entries are only produced by seeding".into(),
            ));
        }
        let sequence_number = self.next_sequence_number();
        let metadata = EventMetadata::new(
            "world_state.mutation_committed",
            self.session_id,
            sequence_number,
            correlation_id,
            clock,
        );
        let entry = HistoryEntry {
            version: sequence_number,
            episode_id: Some(mutation.episode_id),
            episode_sequence: Some(mutation.episode_sequence),
            kind: mutation.kind,
            summary: mutation.summary,
            recorded_at: metadata.occurred_at,
        };
        self.uncommitted_events.push(WorldStateEvent {
            metadata,
            kind: WorldStateEventKind::MutationCommitted(MutationCommitted {
                session_id: self.session_id,
                entry,
                effects: mutation.effects,
            }),
        });
        Ok(())
    }

    fn apply_effects(&mut self, effects: &WorldEffects) {
        for (member, status) in &effects.crew_updates {
            self.crew.insert(member.clone(), status.clone());
        }
        for (resource, delta) in &effects.resource_deltas {
            let amount = self.resources.entry(resource.clone()).or_insert(0);
            *amount = amount.saturating_add(*delta);
        }
        for change in &effects.relationship_changes {
            match self
                .relationships
                .iter_mut()
                .find(|r| r.from == change.from && r.to == change.to)
            {
                Some(link) => link.affinity = link.affinity.saturating_add(change.delta),
                None => self.relationships.push(Relationship {
                    from: change.from.clone(),
                    to: change.to.clone(),
                    affinity: change.delta,
                }),
            }
        }
    }
}

impl AggregateRoot for WorldState {
    type Event = WorldStateEvent;

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            WorldStateEventKind::WorldSeeded(payload) => {
                self.crew.clone_from(&payload.seed.crew);
                self.resources.clone_from(&payload.seed.resources);
                self.relationships.clone_from(&payload.seed.relationships);
                self.history.push(payload.entry.clone());
            }
            WorldStateEventKind::MutationCommitted(payload) => {
                self.apply_effects(&payload.effects);
                self.history.push(payload.entry.clone());
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

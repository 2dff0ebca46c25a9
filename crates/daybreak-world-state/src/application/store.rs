//! The world state store contract used by the episode state machine.

use std::sync::Arc;

use async_trait::async_trait;
use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::EventRepository;
use tracing::instrument;
use uuid::Uuid;

use crate::application::command_handlers::{self, reconstitute};
use crate::domain::aggregates::WorldState;
use crate::domain::commands::{CommitMutation, SeedWorld};
use crate::domain::mutation::{WorldMutation, WorldSeed};

/// Read/commit access to session worlds.
#[async_trait]
pub trait WorldStateStore: Send + Sync {
    /// Returns the current world and its version. A session that was never
    /// seeded reads as an empty world at version 0.
    async fn read(&self, session_id: Uuid) -> Result<(WorldState, i64), DomainError>;

    /// Applies `mutation` if the world is still at `expected_version` and
    /// returns the new version.
    ///
    /// Fails with `DomainError::ConcurrencyConflict` when another writer got
    /// there first; callers re-read and retry or give up.
    async fn commit(
        &self,
        session_id: Uuid,
        expected_version: i64,
        mutation: WorldMutation,
    ) -> Result<i64, DomainError>;

    /// Creates the world at version 1. Fails with a conflict if it exists.
    async fn seed(&self, session_id: Uuid, seed: WorldSeed) -> Result<i64, DomainError>;
}

/// `WorldStateStore` backed by an event stream per session.
#[derive(Clone)]
pub struct EventSourcedWorldStore {
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
}

impl EventSourcedWorldStore {
    /// Creates a store over `repo`.
    #[must_use]
    pub fn new(repo: Arc<dyn EventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }
}

impl std::fmt::Debug for EventSourcedWorldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSourcedWorldStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl WorldStateStore for EventSourcedWorldStore {
    #[instrument(skip(self))]
    async fn read(&self, session_id: Uuid) -> Result<(WorldState, i64), DomainError> {
        let events = self.repo.load_events(session_id).await?;
        let world = reconstitute(session_id, &events)?;
        let version = world.version();
        Ok((world, version))
    }

    #[instrument(skip(self, mutation), fields(episode_id = %mutation.episode_id, kind = ?mutation.kind))]
    async fn commit(
        &self,
        session_id: Uuid,
        expected_version: i64,
        mutation: WorldMutation,
    ) -> Result<i64, DomainError> {
        let command = CommitMutation {
            correlation_id: mutation.episode_id,
            session_id,
            expected_version,
            mutation,
        };
        command_handlers::handle_commit_mutation(&command, self.clock.as_ref(), self.repo.as_ref())
            .await
    }

    #[instrument(skip(self, seed))]
    async fn seed(&self, session_id: Uuid, seed: WorldSeed) -> Result<i64, DomainError> {
        let command = SeedWorld {
            correlation_id: session_id,
            session_id,
            seed,
        };
        command_handlers::handle_seed_world(&command, self.clock.as_ref(), self.repo.as_ref())
            .await?;
        Ok(1)
    }
}

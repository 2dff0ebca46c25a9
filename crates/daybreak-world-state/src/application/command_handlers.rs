//! Command handlers for the World State context.
//!
//! This module contains application-level command handler functions that
//! orchestrate domain logic: load aggregate, execute command, persist events.

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::aggregates::WorldState;
use crate::domain::commands::{CommitMutation, SeedWorld};
use crate::domain::events::{WorldStateEvent, WorldStateEventKind};

/// Reconstitutes a `WorldState` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    session_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<WorldState, DomainError> {
    let mut world = WorldState::new(session_id);
    for stored in existing_events {
        let kind: WorldStateEventKind = stored.decode()?;
        world.apply(&WorldStateEvent {
            metadata: stored.metadata(),
            kind,
        });
    }
    Ok(world)
}

/// Handles the `SeedWorld` command: creates the world at version 1.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the world already exists,
/// or any repository error.
pub async fn handle_seed_world(
    command: &SeedWorld,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let existing_events = repo.load_events(command.session_id).await?;
    let mut world = reconstitute(command.session_id, &existing_events)?;

    world.seed(command.seed.clone(), command.correlation_id, clock)?;

    let stored_events: Vec<StoredEvent> = world
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_domain_event)
        .collect();

    repo.append_events(command.session_id, world.version(), &stored_events)
        .await?;

    debug!(session_id = %command.session_id, "world seeded");
    Ok(stored_events)
}

/// Handles the `CommitMutation` command: checks the caller's expected
/// version, applies the mutation and appends exactly one event. Returns the
/// new world version.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the world is no longer at
/// `expected_version` (either on read or at append time), and
/// `DomainError::Validation` if the mutation is malformed. Nothing is
/// written on error.
pub async fn handle_commit_mutation(
    command: &CommitMutation,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<i64, DomainError> {
    let existing_events = repo.load_events(command.session_id).await?;
    let mut world = reconstitute(command.session_id, &existing_events)?;

    if world.version() != command.expected_version {
        warn!(
            session_id = %command.session_id,
            expected = command.expected_version,
            actual = world.version(),
            "stale world version"
        );
        return Err(DomainError::ConcurrencyConflict {
            aggregate_id: command.session_id,
            expected: command.expected_version,
            actual: world.version(),
        });
    }

    world.commit_mutation(command.mutation.clone(), command.correlation_id, clock)?;

    let stored_events: Vec<StoredEvent> = world
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_domain_event)
        .collect();

    repo.append_events(command.session_id, world.version(), &stored_events)
        .await?;

    Ok(world.version() + 1)
}

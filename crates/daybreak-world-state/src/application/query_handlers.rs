//! Query handlers for the World State context.
//!
//! This module contains query handlers that reconstitute aggregates
//! from stored events and return read-only view DTOs.

use std::collections::BTreeMap;

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::error::DomainError;
use daybreak_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::mutation::{HistoryEntry, Relationship};

/// Read-only view of a session's world.
#[derive(Debug, Serialize)]
pub struct WorldStateView {
    /// The owning session.
    pub session_id: Uuid,
    /// Current version.
    pub version: i64,
    /// Status per crew member.
    pub crew: BTreeMap<String, String>,
    /// Resource amounts.
    pub resources: BTreeMap<String, i64>,
    /// Relationships between entities.
    pub relationships: Vec<Relationship>,
    /// History, oldest first.
    pub history: Vec<HistoryEntry>,
}

/// Retrieves a session's world.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the world has no events.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_world_state(
    session_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<WorldStateView, DomainError> {
    let stored_events = repo.load_events(session_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(session_id));
    }
    let world = command_handlers::reconstitute(session_id, &stored_events)?;
    Ok(WorldStateView {
        session_id,
        version: world.version(),
        crew: world.crew,
        resources: world.resources,
        relationships: world.relationships,
        history: world.history,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use daybreak_core::error::DomainError;
    use daybreak_test_support::{EmptyEventRepository, FixedClock, RecordingEventRepository, fixed_time};
    use uuid::Uuid;

    use super::get_world_state;
    use crate::application::command_handlers::handle_seed_world;
    use crate::domain::commands::SeedWorld;
    use crate::domain::mutation::WorldSeed;

    #[tokio::test]
    async fn test_get_world_state_returns_seeded_view() {
        // Arrange
        let session_id = Uuid::new_v4();
        let repo = RecordingEventRepository::new();
        let command = SeedWorld {
            correlation_id: Uuid::new_v4(),
            session_id,
            seed: WorldSeed {
                crew: BTreeMap::from([("medic".to_owned(), "resting".to_owned())]),
                ..WorldSeed::default()
            },
        };
        handle_seed_world(&command, &FixedClock(fixed_time()), &repo)
            .await
            .unwrap();

        // Act
        let view = get_world_state(session_id, &repo).await.unwrap();

        // Assert
        assert_eq!(view.session_id, session_id);
        assert_eq!(view.version, 1);
        assert_eq!(view.crew["medic"], "resting");
        assert_eq!(view.history.len(), 1);
    }

    #[tokio::test]
    async fn test_get_world_state_returns_not_found_for_empty_stream() {
        let session_id = Uuid::new_v4();

        let result = get_world_state(session_id, &EmptyEventRepository).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id == session_id));
    }
}

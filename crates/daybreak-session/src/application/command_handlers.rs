//! Command handlers for the Session context.
//!
//! This module contains application-level command handler functions that
//! orchestrate domain logic: load aggregate, execute command, persist events.

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};
use daybreak_world_state::application::store::WorldStateStore;
use daybreak_world_state::domain::mutation::WorldSeed;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::aggregates::{Session, stream_id};
use crate::domain::commands::{AddCharacter, ArchiveSession, CreateSession};
use crate::domain::events::{SessionEvent, SessionEventKind};

/// Reconstitutes a `Session` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    session_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Session, DomainError> {
    let mut session = Session::new(session_id);
    for stored in existing_events {
        let kind: SessionEventKind = stored.decode()?;
        session.apply(&SessionEvent {
            metadata: stored.metadata(),
            kind,
        });
    }
    Ok(session)
}

/// Loads a session from its stream.
///
/// # Errors
///
/// Returns a repository or deserialization error.
pub(crate) async fn load(session_id: Uuid, repo: &dyn EventRepository) -> Result<Session, DomainError> {
    let events = repo.load_events(stream_id(session_id)).await?;
    reconstitute(session_id, &events)
}

/// Appends the session's uncommitted events and applies them. On error the
/// pending events are discarded.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the stream moved, or any
/// repository error.
pub(crate) async fn persist(
    session: &mut Session,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let stored_events: Vec<StoredEvent> = session
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_domain_event)
        .collect();
    if let Err(e) = repo
        .append_events(session.aggregate_id(), session.version(), &stored_events)
        .await
    {
        session.clear_uncommitted_events();
        return Err(e);
    }
    session.mark_committed();
    Ok(stored_events)
}

/// Handles the `CreateSession` command: records the session and its
/// starting characters, then seeds the session's world at version 1.
///
/// # Errors
///
/// Returns `DomainError::Validation` for an existing session, a blank
/// setting or an invalid character, `DomainError::ConcurrencyConflict` if
/// the world was already seeded, or any repository error.
pub async fn handle_create_session(
    command: &CreateSession,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
    world: &dyn WorldStateStore,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut session = load(command.session_id, repo).await?;

    session.create(
        command.setting.clone(),
        command.crew.keys().cloned().collect(),
        command.correlation_id,
        clock,
    )?;
    for spec in &command.characters {
        session.add_character(
            spec.character_id,
            spec.name.clone(),
            spec.personality.clone(),
            spec.relationships.clone(),
            command.correlation_id,
            clock,
        )?;
    }

    let stored_events = persist(&mut session, repo).await?;

    world
        .seed(
            command.session_id,
            WorldSeed {
                crew: command.crew.clone(),
                resources: command.resources.clone(),
                relationships: Vec::new(),
            },
        )
        .await?;

    info!(
        session_id = %command.session_id,
        characters = session.characters.len(),
        "session created"
    );
    Ok(stored_events)
}

/// Handles the `AddCharacter` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown session,
/// `DomainError::Validation` for an invalid character, or any repository
/// error.
pub async fn handle_add_character(
    command: &AddCharacter,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut session = load(command.session_id, repo).await?;

    let spec = &command.character;
    session.add_character(
        spec.character_id,
        spec.name.clone(),
        spec.personality.clone(),
        spec.relationships.clone(),
        command.correlation_id,
        clock,
    )?;

    let stored_events = persist(&mut session, repo).await?;
    debug!(session_id = %command.session_id, character_id = %spec.character_id, "character added");
    Ok(stored_events)
}

/// Handles the `ArchiveSession` command. Archiving an archived session
/// appends nothing.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown session, or any
/// repository error.
pub async fn handle_archive_session(
    command: &ArchiveSession,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut session = load(command.session_id, repo).await?;

    if !session.archive(command.correlation_id, clock)? {
        return Ok(Vec::new());
    }

    let stored_events = persist(&mut session, repo).await?;
    info!(session_id = %command.session_id, "session archived");
    Ok(stored_events)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use daybreak_core::clock::Clock;
    use daybreak_test_support::{FailingEventRepository, FixedClock, RecordingEventRepository, fixed_time};
    use daybreak_world_state::application::store::EventSourcedWorldStore;

    use super::*;
    use crate::domain::commands::CharacterSpec;

    fn create_command(session_id: Uuid) -> CreateSession {
        CreateSession {
            correlation_id: Uuid::new_v4(),
            session_id,
            setting: "A survey ship adrift near a dead star.".to_owned(),
            crew: BTreeMap::from([
                ("Vega".to_owned(), "on watch".to_owned()),
                ("Imani".to_owned(), "asleep".to_owned()),
            ]),
            resources: BTreeMap::from([("oxygen".to_owned(), 100)]),
            characters: vec![CharacterSpec {
                character_id: Uuid::new_v4(),
                name: "Dr. Okafor".to_owned(),
                personality: serde_json::json!({ "traits": ["cautious"] }),
                relationships: Vec::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_create_session_records_session_and_seeds_world() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_time()));
        let world = EventSourcedWorldStore::new(repo.clone(), clock.clone());
        let session_id = Uuid::new_v4();

        // Act
        let events = handle_create_session(&create_command(session_id), clock.as_ref(), repo.as_ref(), &world)
            .await
            .unwrap();

        // Assert
        assert_eq!(events.len(), 2);
        assert_eq!(
            repo.event_types(stream_id(session_id)),
            vec!["session.created", "session.character_added"]
        );
        let (state, version) = world.read(session_id).await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(state.resources.get("oxygen"), Some(&100));
        assert_eq!(state.crew.len(), 2);
    }

    #[tokio::test]
    async fn test_create_session_twice_is_rejected() {
        let repo = Arc::new(RecordingEventRepository::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_time()));
        let world = EventSourcedWorldStore::new(repo.clone(), clock.clone());
        let command = create_command(Uuid::new_v4());
        handle_create_session(&command, clock.as_ref(), repo.as_ref(), &world)
            .await
            .unwrap();

        let result = handle_create_session(&command, clock.as_ref(), repo.as_ref(), &world).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_add_character_to_unknown_session_is_not_found() {
        let repo = RecordingEventRepository::new();
        let command = AddCharacter {
            correlation_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            character: CharacterSpec {
                character_id: Uuid::new_v4(),
                name: "Imani".to_owned(),
                personality: serde_json::Value::Null,
                relationships: Vec::new(),
            },
        };

        let result = handle_add_character(&command, &FixedClock(fixed_time()), &repo).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }

    #[tokio::test]
    async fn test_archive_is_idempotent() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_time()));
        let world = EventSourcedWorldStore::new(repo.clone(), clock.clone());
        let session_id = Uuid::new_v4();
        handle_create_session(&create_command(session_id), clock.as_ref(), repo.as_ref(), &world)
            .await
            .unwrap();
        let command = ArchiveSession {
            correlation_id: Uuid::new_v4(),
            session_id,
        };

        // Act
        let first = handle_archive_session(&command, clock.as_ref(), repo.as_ref()).await.unwrap();
        let second = handle_archive_session(&command, clock.as_ref(), repo.as_ref()).await.unwrap();

        // Assert
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_repository_failure_propagates() {
        let repo = FailingEventRepository;
        let command = ArchiveSession {
            correlation_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        };

        let result = handle_archive_session(&command, &FixedClock(fixed_time()), &repo).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}

//! Persistence of episode transitions.

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::aggregates::Episode;
use crate::domain::events::{EpisodeEvent, EpisodeEventKind};
use crate::domain::state::EpisodeState;

/// Reconstitutes an `Episode` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    episode_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Episode, DomainError> {
    let mut episode = Episode::new(episode_id);
    for stored in existing_events {
        let kind: EpisodeEventKind = stored.decode()?;
        episode.apply(&EpisodeEvent {
            metadata: stored.metadata(),
            kind,
        });
    }
    Ok(episode)
}

/// Appends the episode's uncommitted transitions and applies them. On error
/// the pending transitions are discarded and the episode is unchanged.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the stream moved, or any
/// repository error.
pub async fn record_transition(
    episode: &mut Episode,
    repo: &dyn EventRepository,
) -> Result<(), DomainError> {
    let stored_events: Vec<StoredEvent> = episode
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_domain_event)
        .collect();
    if let Err(e) = repo
        .append_events(episode.id, episode.version(), &stored_events)
        .await
    {
        episode.clear_uncommitted_events();
        return Err(e);
    }
    episode.mark_committed();
    debug!(episode_id = %episode.id, state = %episode.state(), "episode transition recorded");
    Ok(())
}

/// Fails an episode whose runner is gone (the process restarted while it
/// was live). Returns the episode's terminal state; an episode that already
/// ended is left untouched.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown episode, or any
/// repository error.
pub async fn handle_interrupt(
    episode_id: Uuid,
    reason: &str,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<EpisodeState, DomainError> {
    let events = repo.load_events(episode_id).await?;
    if events.is_empty() {
        return Err(DomainError::AggregateNotFound(episode_id));
    }
    let mut episode = reconstitute(episode_id, &events)?;
    let state = episode.state();
    if state.is_terminal() {
        return Ok(state);
    }

    episode
        .fail(reason, clock)
        .map_err(|e| DomainError::Validation(e.to_string()))?;
    record_transition(&mut episode, repo).await?;
    warn!(%episode_id, from = %state, reason, "interrupted episode failed");
    Ok(EpisodeState::Failed)
}

#[cfg(test)]
mod tests {
    use daybreak_test_support::{FailingEventRepository, FixedClock, RecordingEventRepository, fixed_time};

    use super::*;

    #[tokio::test]
    async fn test_record_transition_appends_and_applies() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let repo = RecordingEventRepository::new();
        let mut episode = Episode::new(Uuid::new_v4());
        episode.schedule(Uuid::new_v4(), 4, 9, &clock).unwrap();
        episode.request_narrative(vec![Uuid::new_v4()], &clock).unwrap();

        // Act
        record_transition(&mut episode, &repo).await.unwrap();

        // Assert
        assert_eq!(episode.version(), 2);
        assert!(episode.uncommitted_events().is_empty());
        assert_eq!(
            repo.event_types(episode.id),
            vec!["episode.scheduled", "episode.narrative_requested"]
        );
        let rebuilt = reconstitute(episode.id, &repo.load_events(episode.id).await.unwrap()).unwrap();
        assert_eq!(rebuilt.state(), EpisodeState::NarrativePending);
        assert_eq!(rebuilt.sequence, 4);
        assert_eq!(rebuilt.world_version_at_start, 9);
    }

    #[tokio::test]
    async fn test_failed_append_discards_pending_transition() {
        let clock = FixedClock(fixed_time());
        let mut episode = Episode::new(Uuid::new_v4());
        episode.schedule(Uuid::new_v4(), 1, 0, &clock).unwrap();

        let result = record_transition(&mut episode, &FailingEventRepository).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert_eq!(episode.version(), 0);
        assert!(episode.uncommitted_events().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_fails_a_live_episode() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let repo = RecordingEventRepository::new();
        let mut episode = Episode::new(Uuid::new_v4());
        episode.schedule(Uuid::new_v4(), 1, 1, &clock).unwrap();
        episode.request_narrative(vec![Uuid::new_v4()], &clock).unwrap();
        record_transition(&mut episode, &repo).await.unwrap();

        // Act
        let state = handle_interrupt(episode.id, "restarted", &clock, &repo).await.unwrap();

        // Assert
        assert_eq!(state, EpisodeState::Failed);
        assert_eq!(repo.event_types(episode.id).last().map(String::as_str), Some("episode.failed"));
    }

    #[tokio::test]
    async fn test_interrupt_leaves_a_finished_episode_alone() {
        let clock = FixedClock(fixed_time());
        let repo = RecordingEventRepository::new();
        let mut episode = Episode::new(Uuid::new_v4());
        episode.schedule(Uuid::new_v4(), 1, 1, &clock).unwrap();
        episode.abort("stopped", &clock).unwrap();
        record_transition(&mut episode, &repo).await.unwrap();

        let state = handle_interrupt(episode.id, "restarted", &clock, &repo).await.unwrap();

        assert_eq!(state, EpisodeState::Aborted);
        assert_eq!(repo.event_types(episode.id).len(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_unknown_episode_is_not_found() {
        let result = handle_interrupt(
            Uuid::new_v4(),
            "restarted",
            &FixedClock(fixed_time()),
            &RecordingEventRepository::new(),
        )
        .await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }
}

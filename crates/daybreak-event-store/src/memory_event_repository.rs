//! In-memory implementation of the `EventRepository` trait.
//!
//! Used when no database is configured and by cross-crate tests. Streams live
//! only as long as the process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};

/// Event repository holding every stream in a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of events stored for `aggregate_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn stream_len(&self, aggregate_id: Uuid) -> usize {
        self.streams
            .lock()
            .unwrap()
            .get(&aggregate_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self
            .streams
            .lock()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut streams = self
            .streams
            .lock()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))?;
        let stream = streams.entry(aggregate_id).or_default();

        let actual = stream.last().map_or(0, |e| e.sequence_number);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        stream.extend_from_slice(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;

    fn make_stored_event(aggregate_id: Uuid, sequence_number: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id,
            event_type: "world_state.mutation_committed".to_owned(),
            payload: serde_json::json!({ "summary": "the crew held course" }),
            sequence_number,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_unknown_stream_is_empty() {
        let repo = InMemoryEventRepository::new();
        let loaded = repo.load_events(Uuid::new_v4()).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_appends_accumulate_in_order() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();

        // Act
        repo.append_events(id, 0, &[make_stored_event(id, 1), make_stored_event(id, 2)])
            .await
            .unwrap();
        repo.append_events(id, 2, &[make_stored_event(id, 3)])
            .await
            .unwrap();

        // Assert
        let loaded = repo.load_events(id).await.unwrap();
        let sequence: Vec<i64> = loaded.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![1, 2, 3]);
        assert_eq!(repo.stream_len(id), 3);
    }

    #[tokio::test]
    async fn test_stale_expected_version_is_rejected_without_writing() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();
        repo.append_events(id, 0, &[make_stored_event(id, 1)])
            .await
            .unwrap();

        // Act
        let result = repo
            .append_events(id, 0, &[make_stored_event(id, 1), make_stored_event(id, 2)])
            .await;

        // Assert
        match result {
            Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => {
                assert_eq!(aggregate_id, id);
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(repo.stream_len(id), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_at_same_version_admit_exactly_one() {
        // Arrange
        let repo = Arc::new(InMemoryEventRepository::new());
        let id = Uuid::new_v4();

        // Act
        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.append_events(id, 0, &[make_stored_event(id, 1)]).await
            }));
        }
        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        // Assert
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(repo.stream_len(id), 1);
    }

    #[tokio::test]
    async fn test_empty_append_is_noop_even_with_stale_version() {
        let repo = InMemoryEventRepository::new();
        let id = Uuid::new_v4();
        repo.append_events(id, 7, &[]).await.unwrap();
        assert_eq!(repo.stream_len(id), 0);
    }
}

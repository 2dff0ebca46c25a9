//! Test repositories — mock `EventRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

type AppendRecord = (Uuid, i64, Vec<StoredEvent>);

/// An event repository that keeps streams in memory with real
/// optimistic-concurrency checks and records every successful append.
#[derive(Debug, Default)]
pub struct RecordingEventRepository {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
    appended: Mutex<Vec<AppendRecord>>,
}

impl RecordingEventRepository {
    /// Create an empty recording repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository whose `aggregate_id` stream is pre-seeded.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_stream(aggregate_id: Uuid, events: Vec<StoredEvent>) -> Self {
        let repo = Self::default();
        repo.streams.lock().unwrap().insert(aggregate_id, events);
        repo
    }

    /// Returns a snapshot of all appends, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<AppendRecord> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns the event types appended to `aggregate_id`, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_types(&self, aggregate_id: Uuid) -> Vec<String> {
        self.streams
            .lock()
            .unwrap()
            .get(&aggregate_id)
            .map(|events| events.iter().map(|e| e.event_type.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .streams
            .lock()
            .unwrap()
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap();
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
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts appends. Useful for "aggregate not found" scenarios.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// A recording repository that rejects the next `conflicts` appends to one
/// stream with `ConcurrencyConflict`, simulating an interfering writer.
#[derive(Debug)]
pub struct ConflictingEventRepository {
    inner: RecordingEventRepository,
    target: Uuid,
    remaining: Mutex<u32>,
}

impl ConflictingEventRepository {
    /// Rejects the next `conflicts` appends to `target`; other streams behave
    /// like `RecordingEventRepository`.
    #[must_use]
    pub fn new(target: Uuid, conflicts: u32) -> Self {
        Self {
            inner: RecordingEventRepository::new(),
            target,
            remaining: Mutex::new(conflicts),
        }
    }

    /// The wrapped repository, for assertions.
    #[must_use]
    pub fn inner(&self) -> &RecordingEventRepository {
        &self.inner
    }

    /// Arms `conflicts` more rejections.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn arm(&self, conflicts: u32) {
        *self.remaining.lock().unwrap() = conflicts;
    }
}

#[async_trait]
impl EventRepository for ConflictingEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.load_events(aggregate_id).await
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if aggregate_id == self.target {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: expected_version + 1,
                });
            }
        }
        self.inner
            .append_events(aggregate_id, expected_version, events)
            .await
    }
}

//! Integration tests for `PgEventRepository`.
//!
//! These run against a throwaway database provisioned by `#[sqlx::test]`
//! (requires `DATABASE_URL`).

use chrono::Utc;
use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};
use daybreak_event_store::pg_event_repository::PgEventRepository;
use sqlx::PgPool;
use uuid::Uuid;

fn ballot_event(episode_id: Uuid, sequence_number: i64, player: &str) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        aggregate_id: episode_id,
        event_type: "vote.cast".to_string(),
        payload: serde_json::json!({ "VoteCast": { "player_id": player, "choice": "investigate" } }),
        sequence_number,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at: Utc::now(),
    }
}

fn expect_conflict(result: Result<(), DomainError>) -> (Uuid, i64, i64) {
    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }) => (aggregate_id, expected, actual),
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_events_returns_empty_vec_for_unknown_stream(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let events = repo.load_events(Uuid::new_v4()).await.unwrap();

    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_appended_event_is_loaded_with_all_metadata(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let episode_id = Uuid::new_v4();
    let event = ballot_event(episode_id, 1, "player-1");
    let original = event.clone();

    repo.append_events(episode_id, 0, &[event]).await.unwrap();

    let loaded = repo.load_events(episode_id).await.unwrap();
    assert_eq!(loaded.len(), 1);
    let e = &loaded[0];
    assert_eq!(e.event_id, original.event_id);
    assert_eq!(e.aggregate_id, episode_id);
    assert_eq!(e.event_type, "vote.cast");
    assert_eq!(e.payload, original.payload);
    assert_eq!(e.sequence_number, 1);
    assert_eq!(e.correlation_id, original.correlation_id);
    assert_eq!(e.causation_id, original.causation_id);
    // TIMESTAMPTZ keeps microsecond precision.
    assert_eq!(
        e.occurred_at.timestamp_micros(),
        original.occurred_at.timestamp_micros()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_streams_are_isolated_and_ordered(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    repo.append_events(
        first,
        0,
        &[
            ballot_event(first, 1, "a"),
            ballot_event(first, 2, "b"),
            ballot_event(first, 3, "c"),
        ],
    )
    .await
    .unwrap();
    repo.append_events(second, 0, &[ballot_event(second, 1, "z")])
        .await
        .unwrap();

    let loaded_first = repo.load_events(first).await.unwrap();
    let loaded_second = repo.load_events(second).await.unwrap();
    let sequence: Vec<i64> = loaded_first.iter().map(|e| e.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3]);
    assert_eq!(loaded_second.len(), 1);
    assert_eq!(loaded_second[0].aggregate_id, second);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_sequence_number_is_a_conflict(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let episode_id = Uuid::new_v4();
    repo.append_events(episode_id, 0, &[ballot_event(episode_id, 1, "a")])
        .await
        .unwrap();

    let result = repo
        .append_events(episode_id, 0, &[ballot_event(episode_id, 1, "b")])
        .await;

    assert_eq!(expect_conflict(result), (episode_id, 0, 1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_version_is_rejected_even_without_overlap(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let episode_id = Uuid::new_v4();
    repo.append_events(
        episode_id,
        0,
        &[ballot_event(episode_id, 1, "a"), ballot_event(episode_id, 2, "b")],
    )
    .await
    .unwrap();

    let result = repo
        .append_events(
            episode_id,
            0,
            &[ballot_event(episode_id, 3, "c"), ballot_event(episode_id, 4, "d")],
        )
        .await;

    assert_eq!(expect_conflict(result), (episode_id, 0, 2));
    assert_eq!(repo.load_events(episode_id).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_appends_at_same_version_admit_one(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let world_id = Uuid::new_v4();

    let attempts = (0..8).map(|i| {
        let repo = repo.clone();
        async move {
            repo.append_events(world_id, 0, &[ballot_event(world_id, 1, &i.to_string())])
                .await
        }
    });
    let results = futures::future::join_all(attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(DomainError::is_conflict)
    );
    assert_eq!(repo.load_events(world_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_empty_events_is_noop(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let episode_id = Uuid::new_v4();

    repo.append_events(episode_id, 0, &[]).await.unwrap();

    assert!(repo.load_events(episode_id).await.unwrap().is_empty());
}

//! Scheduler behaviour across whole episodes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::repository::{EventRepository, StoredEvent};
use daybreak_episode::application::command_handlers::record_transition;
use daybreak_episode::application::query_handlers::get_episode;
use daybreak_episode::testing::RecordingPublisher;
use daybreak_episode::{Episode, EpisodeConfig, EpisodeRunner, EpisodeState};
use daybreak_generation::testing::{ScriptedService, Step};
use daybreak_generation::{Dispatcher, JobKind, RetryPolicy, ServiceRouter};
use daybreak_session::application::command_handlers::handle_create_session;
use daybreak_session::application::query_handlers::get_session;
use daybreak_session::domain::aggregates::stream_id;
use daybreak_session::domain::commands::{CharacterSpec, CreateSession};
use daybreak_session::{Cadence, SchedulerError, SessionScheduler, TriggerOutcome};
use daybreak_test_support::{ConflictingEventRepository, FixedClock, MockRng, fixed_time};
use daybreak_voting::{VoteAggregator, VotingPolicy};
use daybreak_world_state::application::store::EventSourcedWorldStore;
use uuid::Uuid;

struct Harness {
    repo: Arc<ConflictingEventRepository>,
    clock: Arc<dyn Clock>,
    service: Arc<ScriptedService>,
    scheduler: SessionScheduler,
    session_id: Uuid,
}

impl Harness {
    async fn new() -> Self {
        let session_id = Uuid::new_v4();
        let repo = Arc::new(ConflictingEventRepository::new(stream_id(session_id), 0));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_time()));
        let world = Arc::new(EventSourcedWorldStore::new(repo.clone(), clock.clone()));
        let votes = Arc::new(VoteAggregator::new(repo.clone(), clock.clone(), VotingPolicy::default()));
        let service = Arc::new(ScriptedService::new());
        let router = ServiceRouter::new()
            .text(service.clone())
            .npc(service.clone())
            .media(service.clone());
        let runner = Arc::new(EpisodeRunner::new(
            repo.clone(),
            clock.clone(),
            world.clone(),
            votes,
            Dispatcher::new(router, RetryPolicy::default(), Box::new(MockRng)),
            Arc::new(RecordingPublisher::new()),
            EpisodeConfig {
                vote_window: Duration::from_secs(30),
                ..EpisodeConfig::default()
            },
        ));
        let scheduler = SessionScheduler::new(repo.clone(), clock.clone(), runner);

        let command = CreateSession {
            correlation_id: session_id,
            session_id,
            setting: "A survey ship adrift near a dead star.".to_owned(),
            crew: BTreeMap::from([("Vega".to_owned(), "on watch".to_owned())]),
            resources: BTreeMap::new(),
            characters: vec![CharacterSpec {
                character_id: Uuid::new_v4(),
                name: "Dr. Okafor".to_owned(),
                personality: serde_json::json!({ "traits": ["cautious"] }),
                relationships: Vec::new(),
            }],
        };
        handle_create_session(&command, clock.as_ref(), repo.as_ref(), world.as_ref())
            .await
            .unwrap();

        Self {
            repo,
            clock,
            service,
            scheduler,
            session_id,
        }
    }

    async fn wait_until_idle(&self) {
        while self.scheduler.active_episode(self.session_id).await.is_some() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_trigger_while_live_is_dropped() {
    // Arrange
    let harness = Harness::new().await;
    let TriggerOutcome::Started { episode_id } = harness.scheduler.trigger(harness.session_id).await.unwrap() else {
        panic!("first trigger should start an episode");
    };

    // Act
    let second = harness.scheduler.trigger(harness.session_id).await.unwrap();

    // Assert
    assert_eq!(second, TriggerOutcome::Dropped { active: episode_id });
    harness.wait_until_idle().await;
    let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
    assert_eq!(session.last_sequence, 1);
    assert_eq!(session.last_episode_state, Some(EpisodeState::Completed));
    assert!(session.active_episode.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_triggers_start_exactly_one_episode() {
    // Arrange
    let harness = Harness::new().await;

    // Act
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = harness.scheduler.clone();
            let session_id = harness.session_id;
            tokio::spawn(async move { scheduler.trigger(session_id).await.unwrap() })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    // Assert
    let started: Vec<Uuid> = outcomes
        .iter()
        .filter_map(|o| match o {
            TriggerOutcome::Started { episode_id } => Some(*episode_id),
            TriggerOutcome::Dropped { .. } => None,
        })
        .collect();
    assert_eq!(started.len(), 1);
    assert!(outcomes.iter().all(|o| match o {
        TriggerOutcome::Started { .. } => true,
        TriggerOutcome::Dropped { active } => *active == started[0],
    }));
    harness.wait_until_idle().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_episode_does_not_stop_the_cadence() {
    // Arrange
    let harness = Harness::new().await;
    harness.service.script(
        JobKind::Narrative,
        vec![
            Step::transient("503"),
            Step::transient("503"),
            Step::transient("503"),
        ],
    );

    // Act
    harness
        .scheduler
        .schedule(harness.session_id, Cadence::Every(Duration::from_secs(60)))
        .await
        .unwrap();
    loop {
        let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
        if session.last_sequence == 2 && session.active_episode.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    // Assert
    let types = harness.repo.inner().event_types(stream_id(harness.session_id));
    assert_eq!(
        types,
        vec![
            "session.created",
            "session.character_added",
            "session.episode_started",
            "session.episode_finished",
            "session.episode_started",
            "session.episode_finished",
        ]
    );
    let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
    assert_eq!(session.last_episode_state, Some(EpisodeState::Completed));
    assert_eq!(harness.service.call_count(JobKind::Narrative), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aborts_live_episode_and_archives_session() {
    // Arrange
    let harness = Harness::new().await;
    harness
        .scheduler
        .schedule(harness.session_id, Cadence::Every(Duration::from_secs(3600)))
        .await
        .unwrap();
    let TriggerOutcome::Started { episode_id } = harness.scheduler.trigger(harness.session_id).await.unwrap() else {
        panic!("trigger should start an episode");
    };
    tokio::time::sleep(Duration::from_secs(5)).await;

    // Act
    let signalled = harness.scheduler.cancel(harness.session_id).await.unwrap();
    harness.wait_until_idle().await;

    // Assert
    assert_eq!(signalled, Some(episode_id));
    let episode = get_episode(episode_id, harness.repo.as_ref()).await.unwrap();
    assert_eq!(episode.state, EpisodeState::Aborted);
    let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
    assert!(session.archived_at.is_some());
    assert_eq!(session.last_episode_state, Some(EpisodeState::Aborted));
    assert!(harness.scheduler.cadence(harness.session_id).await.is_none());
    assert!(matches!(
        harness.scheduler.trigger(harness.session_id).await,
        Err(SchedulerError::SessionArchived(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_session_cannot_be_triggered_or_scheduled() {
    let harness = Harness::new().await;
    let unknown = Uuid::new_v4();

    assert!(matches!(
        harness.scheduler.trigger(unknown).await,
        Err(SchedulerError::UnknownSession(_))
    ));
    assert!(matches!(
        harness.scheduler.schedule(unknown, Cadence::default()).await,
        Err(SchedulerError::UnknownSession(_))
    ));
    assert!(harness.scheduler.active_episode(unknown).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_finished_sessions_are_no_longer_tracked() {
    // Arrange
    let harness = Harness::new().await;
    let unknown = Uuid::new_v4();

    // Act
    let rejected = harness.scheduler.trigger(unknown).await;
    harness.scheduler.trigger(harness.session_id).await.unwrap();
    let while_live = harness.scheduler.tracked_sessions().await;
    harness.wait_until_idle().await;

    // Assert
    assert!(matches!(rejected, Err(SchedulerError::UnknownSession(_))));
    assert_eq!(while_live, 1);
    assert_eq!(harness.scheduler.tracked_sessions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_forgets_an_idle_scheduled_session() {
    // Arrange
    let harness = Harness::new().await;
    harness
        .scheduler
        .schedule(harness.session_id, Cadence::Every(Duration::from_secs(3600)))
        .await
        .unwrap();

    // Act
    harness.scheduler.cancel(harness.session_id).await.unwrap();

    // Assert
    assert_eq!(harness.scheduler.tracked_sessions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_episode_end_is_recorded_after_a_session_conflict() {
    // Arrange
    let harness = Harness::new().await;
    let TriggerOutcome::Started { episode_id } = harness.scheduler.trigger(harness.session_id).await.unwrap() else {
        panic!("trigger should start an episode");
    };
    harness.repo.arm(1);

    // Act
    harness.wait_until_idle().await;

    // Assert
    let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
    assert!(session.active_episode.is_none());
    assert_eq!(session.last_episode_state, Some(EpisodeState::Completed));
    let episode = get_episode(episode_id, harness.repo.as_ref()).await.unwrap();
    assert_eq!(episode.state, EpisodeState::Completed);
    let types = harness.repo.inner().event_types(stream_id(harness.session_id));
    assert_eq!(types.last().map(String::as_str), Some("session.episode_finished"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_archives_after_a_session_conflict() {
    // Arrange
    let harness = Harness::new().await;
    harness.repo.arm(1);

    // Act
    let signalled = harness.scheduler.cancel(harness.session_id).await.unwrap();

    // Assert
    assert!(signalled.is_none());
    let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
    assert!(session.archived_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_is_rejected() {
    let harness = Harness::new().await;

    let result = harness
        .scheduler
        .schedule(harness.session_id, Cadence::Every(Duration::ZERO))
        .await;

    assert!(matches!(result, Err(SchedulerError::Domain(_))));
}

#[tokio::test(start_paused = true)]
async fn test_episode_left_live_by_a_restart_is_failed_before_the_next_starts() {
    // Arrange
    let harness = Harness::new().await;
    let stale = Uuid::new_v4();
    let mut episode = Episode::new(stale);
    episode
        .schedule(harness.session_id, 1, 1, harness.clock.as_ref())
        .unwrap();
    record_transition(&mut episode, harness.repo.as_ref()).await.unwrap();

    let events = harness.repo.load_events(stream_id(harness.session_id)).await.unwrap();
    let mut session = daybreak_session::Session::new(harness.session_id);
    for stored in &events {
        session.apply(&daybreak_session::domain::events::SessionEvent {
            metadata: stored.metadata(),
            kind: stored.decode().unwrap(),
        });
    }
    session.start_episode(stale, stale, harness.clock.as_ref()).unwrap();
    let pending: Vec<StoredEvent> = session
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_domain_event)
        .collect();
    harness
        .repo
        .append_events(stream_id(harness.session_id), session.version(), &pending)
        .await
        .unwrap();

    // Act
    let outcome = harness.scheduler.trigger(harness.session_id).await.unwrap();
    harness.wait_until_idle().await;

    // Assert
    assert!(matches!(outcome, TriggerOutcome::Started { .. }));
    let interrupted = get_episode(stale, harness.repo.as_ref()).await.unwrap();
    assert_eq!(interrupted.state, EpisodeState::Failed);
    let session = get_session(harness.session_id, harness.repo.as_ref()).await.unwrap();
    assert_eq!(session.last_sequence, 2);
    assert_eq!(session.last_episode_state, Some(EpisodeState::Completed));
}

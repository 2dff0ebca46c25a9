//! Routes for the Episode and Vote Aggregation bounded contexts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use daybreak_episode::application::query_handlers::{self, EpisodeView};
use daybreak_voting::{BallotSnapshot, VoteError};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{episode_id}/votes.
#[derive(Debug, Deserialize)]
pub struct SubmitVoteRequest {
    /// The voting player. A later vote from the same player replaces
    /// the earlier one.
    pub player_id: String,
    /// The chosen option key.
    pub choice: String,
}

/// Response body for an accepted vote.
#[derive(Debug, Serialize)]
pub struct VoteAccepted {
    /// The episode voted on.
    pub episode_id: Uuid,
    /// The voting player.
    pub player_id: String,
    /// The choice now counted for the player.
    pub choice: String,
}

/// POST /{episode_id}/votes
#[instrument(skip(state, request), fields(player_id = %request.player_id))]
async fn submit_vote(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
    Json(request): Json<SubmitVoteRequest>,
) -> Result<(StatusCode, Json<VoteAccepted>), ApiError> {
    let submitted = state
        .votes
        .submit(episode_id, &request.player_id, &request.choice)
        .await;
    if let Err(VoteError::UnknownEpisode(_)) = submitted {
        // Finished episodes no longer hold their window in memory.
        if !state.event_repository.load_events(episode_id).await?.is_empty() {
            return Err(VoteError::WindowClosed(episode_id).into());
        }
    }
    submitted?;

    info!(choice = %request.choice, "vote accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(VoteAccepted {
            episode_id,
            player_id: request.player_id,
            choice: request.choice,
        }),
    ))
}

/// GET /{episode_id}
#[instrument(skip(state))]
async fn get_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> Result<Json<EpisodeView>, ApiError> {
    let view = query_handlers::get_episode(episode_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// GET /{episode_id}/ballot
#[instrument(skip(state))]
async fn get_ballot(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> Result<Json<BallotSnapshot>, ApiError> {
    let snapshot = state.votes.ballot(episode_id).await?;
    Ok(Json(snapshot))
}

/// Returns the router for the episode context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{episode_id}", get(get_episode))
        .route("/{episode_id}/ballot", get(get_ballot))
        .route("/{episode_id}/votes", post(submit_vote))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use daybreak_core::clock::Clock;
    use daybreak_core::repository::StoredEvent;
    use daybreak_episode::testing::RecordingPublisher;
    use daybreak_generation::ServiceRouter;
    use daybreak_test_support::{FixedClock, MockRng, RecordingEventRepository, fixed_time};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::{Settings, Wiring};

    fn test_app_state() -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_time()));
        let wiring = Wiring {
            router: ServiceRouter::new(),
            publisher: Arc::new(RecordingPublisher::new()),
            rng: Box::new(MockRng),
        };
        AppState::assemble(
            Arc::new(RecordingEventRepository::new()),
            clock,
            wiring,
            Settings::default(),
        )
    }

    fn vote(episode_id: Uuid, player_id: &str, choice: &str) -> Request<Body> {
        let body = serde_json::json!({ "player_id": player_id, "choice": choice });
        Request::builder()
            .method("POST")
            .uri(format!("/{episode_id}/votes"))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn json_of(response: axum::response::Response) -> Value {
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body_bytes).unwrap()
    }

    #[tokio::test]
    async fn test_vote_is_accepted_and_counted_once_per_player() {
        // Arrange
        let state = test_app_state();
        let episode_id = Uuid::new_v4();
        state
            .votes
            .open(episode_id, Duration::from_secs(3600), vec!["A".into(), "B".into()])
            .await
            .unwrap();
        let app = router().with_state(state);

        // Act
        let first = app.clone().oneshot(vote(episode_id, "p1", "A")).await.unwrap();
        let second = app.clone().oneshot(vote(episode_id, "p1", "B")).await.unwrap();
        let ballot = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{episode_id}/ballot"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(first.status(), StatusCode::ACCEPTED);
        assert_eq!(second.status(), StatusCode::ACCEPTED);
        assert_eq!(json_of(second).await["choice"], "B");
        let json = json_of(ballot).await;
        assert_eq!(json["total_votes"], 1);
        assert_eq!(json["counts"]["B"], 1);
        assert!(json["counts"].get("A").is_none_or(|count| count == 0));
    }

    #[tokio::test]
    async fn test_vote_for_unknown_episode_returns_404() {
        // Arrange
        let app = router().with_state(test_app_state());

        // Act
        let response = app.oneshot(vote(Uuid::new_v4(), "p1", "A")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_of(response).await["error"], "unknown_episode");
    }

    #[tokio::test]
    async fn test_vote_for_unoffered_choice_returns_422() {
        // Arrange
        let state = test_app_state();
        let episode_id = Uuid::new_v4();
        state
            .votes
            .open(episode_id, Duration::from_secs(3600), vec!["A".into(), "B".into()])
            .await
            .unwrap();
        let app = router().with_state(state);

        // Act
        let response = app.oneshot(vote(episode_id, "p1", "Z")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_of(response).await["error"], "invalid_choice");
    }

    #[tokio::test]
    async fn test_vote_after_close_returns_409() {
        // Arrange
        let state = test_app_state();
        let episode_id = Uuid::new_v4();
        state
            .votes
            .open(episode_id, Duration::from_secs(3600), vec!["A".into()])
            .await
            .unwrap();
        state.votes.close(episode_id).await.unwrap();
        let app = router().with_state(state);

        // Act
        let response = app.oneshot(vote(episode_id, "p1", "A")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_of(response).await["error"], "window_closed");
    }

    #[tokio::test]
    async fn test_vote_for_finished_episode_returns_409() {
        // Arrange
        let state = test_app_state();
        let episode_id = Uuid::new_v4();
        let scheduled = StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: episode_id,
            event_type: "episode.scheduled".to_owned(),
            payload: serde_json::json!({}),
            sequence_number: 1,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: fixed_time(),
        };
        state
            .event_repository
            .append_events(episode_id, 0, &[scheduled])
            .await
            .unwrap();
        let app = router().with_state(state);

        // Act
        let response = app.oneshot(vote(episode_id, "p1", "A")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_of(response).await["error"], "window_closed");
    }

    #[tokio::test]
    async fn test_get_unknown_episode_returns_404() {
        // Arrange
        let app = router().with_state(test_app_state());
        let request = Request::builder()
            .uri(format!("/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

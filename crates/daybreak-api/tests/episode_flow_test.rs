//! A whole day driven through the HTTP surface.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use daybreak_event_store::memory_event_repository::InMemoryEventRepository;
use daybreak_generation::JobKind;
use daybreak_generation::testing::Step;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_day_runs_from_trigger_to_completion() {
    // Arrange
    let app = common::build_test_app(Arc::new(InMemoryEventRepository::new()));
    let session_id = common::create_session(&app).await;

    // Act
    let (status, json) =
        common::post_json(app.router(), &format!("/api/v1/sessions/{session_id}/trigger"), &json!(null)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["result"], "started");
    let episode_id = json["episode_id"].as_str().unwrap().to_owned();

    let ballot_uri = format!("/api/v1/episodes/{episode_id}/ballot");
    common::wait_for(&app, &ballot_uri, |status, json| {
        status == StatusCode::OK && json["status"] == "open"
    })
    .await;

    let votes_uri = format!("/api/v1/episodes/{episode_id}/votes");
    for (player, choice) in [("p1", "A"), ("p2", "B"), ("p2", "A")] {
        let (status, _) = common::post_json(
            app.router(),
            &votes_uri,
            &json!({ "player_id": player, "choice": choice }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let episode = common::wait_for(&app, &format!("/api/v1/episodes/{episode_id}"), |_, json| {
        json["state"] == "completed"
    })
    .await;

    // Assert
    assert_eq!(episode["tally"]["total_votes"], 2);
    assert_eq!(episode["tally"]["counts"]["A"], 2);
    assert_eq!(episode["tally"]["outcome"]["choice"], "A");
    assert_eq!(episode["outcome"]["choice"]["key"], "A");
    assert!(episode["missing"].as_array().unwrap().is_empty());

    let (status, world) = common::get_json(app.router(), &format!("/api/v1/world/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(world["version"], 3);
    assert_eq!(world["world"]["history"].as_array().unwrap().len(), 3);

    let session = common::wait_for(&app, &format!("/api/v1/sessions/{session_id}"), |_, json| {
        json["active_episode"].is_null() && json["live_episode"].is_null()
    })
    .await;
    assert_eq!(session["last_sequence"], 1);
    assert_eq!(session["last_episode_state"], "completed");
    assert_eq!(app.publisher.result_notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_trigger_while_voting_is_dropped() {
    // Arrange
    let app = common::build_test_app(Arc::new(InMemoryEventRepository::new()));
    let session_id = common::create_session(&app).await;
    let trigger_uri = format!("/api/v1/sessions/{session_id}/trigger");
    let (_, first) = common::post_json(app.router(), &trigger_uri, &json!(null)).await;

    // Act
    let (status, second) = common::post_json(app.router(), &trigger_uri, &json!(null)).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["result"], "dropped");
    assert_eq!(second["active"], first["episode_id"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_narrative_is_reported_and_next_trigger_starts() {
    // Arrange
    let app = common::build_test_app(Arc::new(InMemoryEventRepository::new()));
    app.service.script(
        JobKind::Narrative,
        vec![Step::transient("busy"), Step::transient("busy"), Step::transient("busy")],
    );
    let session_id = common::create_session(&app).await;
    let trigger_uri = format!("/api/v1/sessions/{session_id}/trigger");

    // Act
    let (_, first) = common::post_json(app.router(), &trigger_uri, &json!(null)).await;
    let episode_id = first["episode_id"].as_str().unwrap().to_owned();
    let failed = common::wait_for(&app, &format!("/api/v1/episodes/{episode_id}"), |_, json| {
        json["state"] == "failed"
    })
    .await;
    common::wait_for(&app, &format!("/api/v1/sessions/{session_id}"), |_, json| {
        json["active_episode"].is_null() && json["live_episode"].is_null()
    })
    .await;
    let (status, second) = common::post_json(app.router(), &trigger_uri, &json!(null)).await;

    // Assert
    assert!(failed["reason"].as_str().unwrap().contains("narrative generation failed"));
    assert_eq!(app.publisher.failure_notices().len(), 1);
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["result"], "started");
    assert_ne!(second["episode_id"], first["episode_id"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aborts_live_episode_and_archives_session() {
    // Arrange
    let app = common::build_test_app(Arc::new(InMemoryEventRepository::new()));
    let session_id = common::create_session(&app).await;
    let (_, started) = common::post_json(
        app.router(),
        &format!("/api/v1/sessions/{session_id}/trigger"),
        &json!(null),
    )
    .await;
    let episode_id = started["episode_id"].as_str().unwrap().to_owned();
    common::wait_for(&app, &format!("/api/v1/episodes/{episode_id}/ballot"), |status, json| {
        status == StatusCode::OK && json["status"] == "open"
    })
    .await;

    // Act
    let (status, cancelled) = common::post_json(
        app.router(),
        &format!("/api/v1/sessions/{session_id}/cancel"),
        &json!(null),
    )
    .await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["aborted_episode"], started["episode_id"]);
    let episode = common::wait_for(&app, &format!("/api/v1/episodes/{episode_id}"), |_, json| {
        json["state"] == "aborted"
    })
    .await;
    assert_eq!(episode["state"], "aborted");

    let (status, rejected) = common::post_json(
        app.router(),
        &format!("/api/v1/episodes/{episode_id}/votes"),
        &json!({ "player_id": "p1", "choice": "A" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(rejected["error"], "window_closed");

    let (status, json) = common::post_json(
        app.router(),
        &format!("/api/v1/sessions/{session_id}/trigger"),
        &json!(null),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "session_archived");
}

#[tokio::test]
async fn test_world_of_unknown_session_returns_404() {
    let app = common::build_test_app(Arc::new(InMemoryEventRepository::new()));

    let (status, json) =
        common::get_json(app.router(), &format!("/api/v1/world/{}", uuid::Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "aggregate_not_found");
}

#[tokio::test]
async fn test_created_session_seeds_world() {
    // Arrange
    let app = common::build_test_app(Arc::new(InMemoryEventRepository::new()));

    // Act
    let session_id = common::create_session(&app).await;
    let (status, world) = common::get_json(app.router(), &format!("/api/v1/world/{session_id}")).await;
    let (_, session) = common::get_json(app.router(), &format!("/api/v1/sessions/{session_id}")).await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(world["version"], 1);
    assert_eq!(world["world"]["crew"]["Vega"], "on watch");
    assert_eq!(world["world"]["resources"]["fuel"], 10);
    assert_eq!(session["characters"].as_array().unwrap().len(), 1);
    assert!(session["cadence"].is_null());
}

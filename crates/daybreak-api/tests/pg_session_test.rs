//! Session and world round trips against PostgreSQL.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use daybreak_event_store::pg_event_repository::PgEventRepository;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_session_and_world_survive_a_fresh_app(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(Arc::new(PgEventRepository::new(pool.clone())));
    let session_id = common::create_session(&app).await;

    // Act
    let restarted = common::build_test_app(Arc::new(PgEventRepository::new(pool)));
    let (session_status, session) =
        common::get_json(restarted.router(), &format!("/api/v1/sessions/{session_id}")).await;
    let (world_status, world) =
        common::get_json(restarted.router(), &format!("/api/v1/world/{session_id}")).await;

    // Assert
    assert_eq!(session_status, StatusCode::OK);
    assert_eq!(session["setting"], "A survey ship adrift near a dead star.");
    assert_eq!(session["version"], 2);
    assert_eq!(world_status, StatusCode::OK);
    assert_eq!(world["version"], 1);
    assert_eq!(world["world"]["crew"]["Vega"], "on watch");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_session_id_is_rejected(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(Arc::new(PgEventRepository::new(pool)));
    let session_id = common::create_session(&app).await;

    // Act
    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/sessions",
        &serde_json::json!({ "session_id": session_id, "setting": "Another ship." }),
    )
    .await;

    // Assert
    assert!(status.is_client_error());
    assert!(json["error"].is_string());
}

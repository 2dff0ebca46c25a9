//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use daybreak_core::clock::Clock;
use daybreak_core::repository::EventRepository;
use daybreak_episode::EpisodeConfig;
use daybreak_episode::testing::RecordingPublisher;
use daybreak_generation::testing::ScriptedService;
use daybreak_generation::{RetryPolicy, ServiceRouter};
use daybreak_test_support::{FixedClock, MockRng, fixed_time};
use http_body_util::BodyExt;
use tower::ServiceExt;

use daybreak_api::state::{AppState, Settings, Wiring};

/// Vote window used by every integration test.
pub const VOTE_WINDOW: Duration = Duration::from_secs(30);

/// A running app with handles on its test doubles.
pub struct TestApp {
    pub state: AppState,
    pub service: Arc<ScriptedService>,
    pub publisher: Arc<RecordingPublisher>,
}

impl TestApp {
    /// A fresh router over the shared state.
    pub fn router(&self) -> Router {
        daybreak_api::app(self.state.clone())
    }
}

/// Build the full app with scripted generation services, a recording
/// publisher and a fixed clock over `event_repository`.
pub fn build_test_app(event_repository: Arc<dyn EventRepository>) -> TestApp {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_time()));
    let service = Arc::new(ScriptedService::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let wiring = Wiring {
        router: ServiceRouter::new()
            .text(service.clone())
            .npc(service.clone())
            .media(service.clone()),
        publisher: publisher.clone(),
        rng: Box::new(MockRng),
    };
    let settings = Settings {
        episode: EpisodeConfig {
            vote_window: VOTE_WINDOW,
            ..EpisodeConfig::default()
        },
        retry: RetryPolicy::default(),
        ..Settings::default()
    };
    TestApp {
        state: AppState::assemble(event_repository, clock, wiring, settings),
        service,
        publisher,
    }
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Create a session with one crew member and one character.
pub async fn create_session(app: &TestApp) -> String {
    let (status, json) = post_json(
        app.router(),
        "/api/v1/sessions",
        &serde_json::json!({
            "setting": "A survey ship adrift near a dead star.",
            "crew": { "Vega": "on watch" },
            "resources": { "fuel": 10 },
            "characters": [{ "name": "Dr. Okafor", "personality": { "traits": ["cautious"] } }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["session_id"].as_str().unwrap().to_owned()
}

/// Poll `uri` until `done` accepts the body. Sleeps advance paused time.
pub async fn wait_for(
    app: &TestApp,
    uri: &str,
    done: impl Fn(StatusCode, &serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..1_000 {
        let (status, json) = get_json(app.router(), uri).await;
        if done(status, &json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition on {uri} never held");
}

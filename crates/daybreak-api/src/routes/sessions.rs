//! Routes for the Session bounded context.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use daybreak_session::application::command_handlers;
use daybreak_session::application::query_handlers::{self, SessionView};
use daybreak_session::domain::commands::{AddCharacter, CharacterSpec, CreateSession};
use daybreak_session::{Cadence, TriggerOutcome};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// A character in a request body.
#[derive(Debug, Deserialize)]
pub struct CharacterRequest {
    /// Generated when absent.
    pub character_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Opaque personality descriptor.
    #[serde(default)]
    pub personality: serde_json::Value,
    /// Characters this one relates to.
    #[serde(default)]
    pub relationships: Vec<Uuid>,
}

impl From<CharacterRequest> for CharacterSpec {
    fn from(request: CharacterRequest) -> Self {
        Self {
            character_id: request.character_id.unwrap_or_else(Uuid::new_v4),
            name: request.name,
            personality: request.personality,
            relationships: request.relationships,
        }
    }
}

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Generated when absent.
    pub session_id: Option<Uuid>,
    /// The setting fed to narrative generation.
    pub setting: String,
    /// Crew member → starting status.
    #[serde(default)]
    pub crew: BTreeMap<String, String>,
    /// Starting resource amounts.
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
    /// Starting characters.
    #[serde(default)]
    pub characters: Vec<CharacterRequest>,
}

/// Response body for POST /.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    /// The new session.
    pub session_id: Uuid,
    /// IDs of the session events persisted.
    pub event_ids: Vec<Uuid>,
    /// The cadence armed, if any.
    pub cadence: Option<Cadence>,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Response body for GET /{session_id}.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// The persisted session.
    #[serde(flatten)]
    pub session: SessionView,
    /// The cadence armed in this process.
    pub cadence: Option<Cadence>,
    /// The episode this process is running for the session, if any.
    pub live_episode: Option<Uuid>,
}

/// Response body for POST /{session_id}/cancel.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// The session, now archived.
    pub session_id: Uuid,
    /// The live episode that was told to abort.
    pub aborted_episode: Option<Uuid>,
}

/// POST /
#[instrument(skip(state, request))]
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
    let command = CreateSession {
        correlation_id: Uuid::new_v4(),
        session_id,
        setting: request.setting,
        crew: request.crew,
        resources: request.resources,
        characters: request.characters.into_iter().map(CharacterSpec::from).collect(),
    };

    info!(correlation_id = %command.correlation_id, %session_id, "handling create_session command");

    let stored_events = command_handlers::handle_create_session(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
        state.world.as_ref(),
    )
    .await?;

    if let Some(cadence) = state.cadence {
        state.scheduler.schedule(session_id, cadence).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            event_ids: stored_events.iter().map(|e| e.event_id).collect(),
            cadence: state.cadence,
        }),
    ))
}

/// GET /{session_id}
#[instrument(skip(state))]
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = query_handlers::get_session(session_id, &*state.event_repository).await?;
    let cadence = state.scheduler.cadence(session_id).await;
    let live_episode = state.scheduler.active_episode(session_id).await;
    Ok(Json(SessionResponse {
        session,
        cadence,
        live_episode,
    }))
}

/// POST /{session_id}/characters
#[instrument(skip(state, request))]
async fn add_character(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CharacterRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = AddCharacter {
        correlation_id: Uuid::new_v4(),
        session_id,
        character: request.into(),
    };

    info!(correlation_id = %command.correlation_id, "handling add_character command");

    let stored_events = command_handlers::handle_add_character(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    let event_ids = stored_events.iter().map(|e| e.event_id).collect();

    Ok(Json(CommandResponse { event_ids }))
}

/// POST /{session_id}/schedule
#[instrument(skip(state))]
async fn schedule_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(cadence): Json<Cadence>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.schedule(session_id, cadence).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /{session_id}/trigger
#[instrument(skip(state))]
async fn trigger_episode(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TriggerOutcome>), ApiError> {
    let outcome = state.scheduler.trigger(session_id).await?;
    let status = match outcome {
        TriggerOutcome::Started { .. } => StatusCode::ACCEPTED,
        TriggerOutcome::Dropped { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// POST /{session_id}/cancel
#[instrument(skip(state))]
async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let aborted_episode = state.scheduler.cancel(session_id).await?;
    Ok(Json(CancelResponse {
        session_id,
        aborted_episode,
    }))
}

/// Returns the router for the session context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session))
        .route("/{session_id}", get(get_session))
        .route("/{session_id}/characters", post(add_character))
        .route("/{session_id}/schedule", post(schedule_session))
        .route("/{session_id}/trigger", post(trigger_episode))
        .route("/{session_id}/cancel", post(cancel_session))
}

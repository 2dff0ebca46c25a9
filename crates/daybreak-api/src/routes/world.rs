//! Routes for the World State bounded context.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use daybreak_core::error::DomainError;
use daybreak_world_state::domain::aggregates::WorldState;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for GET /{session_id}.
#[derive(Debug, Serialize)]
pub struct WorldResponse {
    /// The session the world belongs to.
    pub session_id: Uuid,
    /// Number of committed mutations, the seed included.
    pub version: i64,
    /// The current world.
    pub world: WorldState,
}

/// GET /{session_id}
#[instrument(skip(state))]
async fn get_world(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<WorldResponse>, ApiError> {
    let (world, version) = state.world.read(session_id).await?;
    if version == 0 {
        return Err(DomainError::AggregateNotFound(session_id).into());
    }
    Ok(Json(WorldResponse {
        session_id,
        version,
        world,
    }))
}

/// Returns the router for the world state context.
pub fn router() -> Router<AppState> {
    Router::new().route("/{session_id}", get(get_world))
}

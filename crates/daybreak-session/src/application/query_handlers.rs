//! Query handlers for the Session context.

use chrono::{DateTime, Utc};
use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::error::DomainError;
use daybreak_core::repository::EventRepository;
use daybreak_episode::EpisodeState;
use serde::Serialize;
use uuid::Uuid;

use super::command_handlers::load;
use crate::domain::character::Character;

/// Read model of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Session identifier.
    pub session_id: Uuid,
    /// The setting.
    pub setting: String,
    /// Crew member names.
    pub crew: Vec<String>,
    /// Characters taking part.
    pub characters: Vec<Character>,
    /// The live episode, if any.
    pub active_episode: Option<Uuid>,
    /// Day number of the latest started episode.
    pub last_sequence: u64,
    /// Terminal state of the latest finished episode.
    pub last_episode_state: Option<EpisodeState>,
    /// When the session ended.
    pub archived_at: Option<DateTime<Utc>>,
    /// Stream version.
    pub version: i64,
}

/// Retrieves a session by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the session was never
/// created, or a repository error.
pub async fn get_session(
    session_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<SessionView, DomainError> {
    let session = load(session_id, repo).await?;
    if !session.created {
        return Err(DomainError::AggregateNotFound(session_id));
    }
    Ok(SessionView {
        session_id,
        version: session.version(),
        setting: session.setting,
        crew: session.crew,
        characters: session.characters,
        active_episode: session.active_episode,
        last_sequence: session.last_sequence,
        last_episode_state: session.last_episode_state,
        archived_at: session.archived_at,
    })
}

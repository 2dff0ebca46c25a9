//! Query handlers for the Episode context.

use chrono::{DateTime, Utc};
use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::error::DomainError;
use daybreak_core::repository::EventRepository;
use daybreak_generation::{Choice, ContentJob, JobKind};
use daybreak_voting::Tally;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::outcome::{NpcLine, Outcome, PublishedAsset};
use crate::domain::state::EpisodeState;

/// Read-only view of an episode.
#[derive(Debug, Serialize)]
pub struct EpisodeView {
    /// Episode identifier.
    pub episode_id: Uuid,
    /// The owning session.
    pub session_id: Uuid,
    /// Day number.
    pub sequence: u64,
    /// Current state.
    pub state: EpisodeState,
    /// Stream version.
    pub version: i64,
    /// The story text.
    pub narrative: Option<String>,
    /// The choices on offer.
    pub choices: Vec<Choice>,
    /// Character lines.
    pub npc_lines: Vec<NpcLine>,
    /// The ballot stream of the vote window.
    pub ballot_box_id: Option<Uuid>,
    /// When voting opened.
    pub vote_opened_at: Option<DateTime<Utc>>,
    /// When voting closes.
    pub vote_closes_at: Option<DateTime<Utc>>,
    /// The resolved tally.
    pub tally: Option<Tally>,
    /// The resolved outcome.
    pub outcome: Option<Outcome>,
    /// Generated assets.
    pub assets: Vec<PublishedAsset>,
    /// Content kinds that produced nothing.
    pub missing: Vec<JobKind>,
    /// Tomorrow's teaser.
    pub teaser: Option<String>,
    /// Job records.
    pub jobs: Vec<ContentJob>,
    /// Failure or abort reason.
    pub reason: Option<String>,
}

/// Retrieves an episode by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the episode has no events.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_episode(
    episode_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<EpisodeView, DomainError> {
    let stored_events = repo.load_events(episode_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(episode_id));
    }
    let episode = command_handlers::reconstitute(episode_id, &stored_events)?;
    Ok(EpisodeView {
        episode_id,
        session_id: episode.session_id,
        sequence: episode.sequence,
        state: episode.state(),
        version: episode.version(),
        narrative: episode.narrative,
        choices: episode.choices,
        npc_lines: episode.npc_lines,
        ballot_box_id: episode.ballot_box_id,
        vote_opened_at: episode.vote_opened_at,
        vote_closes_at: episode.vote_closes_at,
        tally: episode.tally,
        outcome: episode.outcome,
        assets: episode.assets,
        missing: episode.missing,
        teaser: episode.teaser,
        jobs: episode.jobs,
        reason: episode.reason,
    })
}

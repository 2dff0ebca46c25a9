//! The vote aggregator service.
//!
//! Windows live in memory behind one `tokio::sync::Mutex` each, so concurrent
//! submissions for the same episode are serialised through persistence and
//! the dedup-map update while different episodes never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::{EventRepository, StoredEvent};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{BallotBox, BallotSnapshot};
use crate::domain::events::{BallotBoxEvent, BallotBoxEventKind};
use crate::domain::tally::{Tally, VotingPolicy};
use crate::error::VoteError;

type Window = Arc<Mutex<BallotBox>>;

/// Collects and resolves player votes per episode.
pub struct VoteAggregator {
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    policy: VotingPolicy,
    windows: RwLock<HashMap<Uuid, Window>>,
}

impl std::fmt::Debug for VoteAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteAggregator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Rebuilds a ballot box from its stream.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    ballot_box_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<BallotBox, DomainError> {
    let mut ballot_box = BallotBox::new(ballot_box_id);
    for stored in existing_events {
        let kind: BallotBoxEventKind = stored.decode()?;
        ballot_box.apply(&BallotBoxEvent {
            metadata: stored.metadata(),
            kind,
        });
    }
    Ok(ballot_box)
}

impl VoteAggregator {
    /// Creates an aggregator persisting ballots to `repo`.
    #[must_use]
    pub fn new(repo: Arc<dyn EventRepository>, clock: Arc<dyn Clock>, policy: VotingPolicy) -> Self {
        Self {
            repo,
            clock,
            policy,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// The resolution policy in force.
    #[must_use]
    pub fn policy(&self) -> VotingPolicy {
        self.policy
    }

    async fn window(&self, episode_id: Uuid) -> Result<Window, VoteError> {
        self.windows
            .read()
            .await
            .get(&episode_id)
            .cloned()
            .ok_or(VoteError::UnknownEpisode(episode_id))
    }

    async fn persist(&self, ballot_box: &mut BallotBox) -> Result<(), DomainError> {
        let stored_events: Vec<StoredEvent> = ballot_box
            .uncommitted_events()
            .iter()
            .map(StoredEvent::from_domain_event)
            .collect();
        let appended = self
            .repo
            .append_events(ballot_box.aggregate_id(), ballot_box.version(), &stored_events)
            .await;
        match appended {
            Ok(()) => {
                ballot_box.mark_committed();
                Ok(())
            }
            Err(e) => {
                ballot_box.clear_uncommitted_events();
                Err(e)
            }
        }
    }

    async fn reload(&self, ballot_box: &mut BallotBox) -> Result<(), DomainError> {
        let events = self.repo.load_events(ballot_box.aggregate_id()).await?;
        *ballot_box = reconstitute(ballot_box.aggregate_id(), &events)?;
        Ok(())
    }

    /// Opens a window for `episode_id` accepting `choices` (empty accepts
    /// any) for `duration`. Returns the ballot box stream id.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::AlreadyOpen` if the episode already has a window,
    /// or a persistence error.
    #[instrument(skip(self, choices), fields(choices = choices.len()))]
    pub async fn open(
        &self,
        episode_id: Uuid,
        duration: Duration,
        choices: Vec<String>,
    ) -> Result<Uuid, VoteError> {
        let duration = chrono::Duration::from_std(duration)
            .map_err(|e| DomainError::Validation(format!("vote window duration: {e}")))?;

        let mut windows = self.windows.write().await;
        if windows.contains_key(&episode_id) {
            return Err(VoteError::AlreadyOpen(episode_id));
        }
        let ballot_box_id = Uuid::new_v4();
        let mut ballot_box = BallotBox::new(ballot_box_id);
        ballot_box.open(episode_id, choices, duration, self.clock.as_ref())?;
        self.persist(&mut ballot_box).await?;

        info!(%episode_id, %ballot_box_id, closes_at = ?ballot_box.closes_at(), "vote window opened");
        windows.insert(episode_id, Arc::new(Mutex::new(ballot_box)));
        Ok(ballot_box_id)
    }

    /// Re-attaches a window persisted on stream `ballot_box_id`, for example
    /// after a restart.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::UnknownEpisode` if the stream holds no window for
    /// `episode_id`, or a persistence error.
    #[instrument(skip(self))]
    pub async fn restore(&self, episode_id: Uuid, ballot_box_id: Uuid) -> Result<(), VoteError> {
        let events = self.repo.load_events(ballot_box_id).await?;
        let ballot_box = reconstitute(ballot_box_id, &events)?;
        if ballot_box.version() == 0 || ballot_box.episode_id() != episode_id {
            return Err(VoteError::UnknownEpisode(episode_id));
        }
        debug!(%episode_id, status = ?ballot_box.status(), "vote window restored");
        self.windows
            .write()
            .await
            .insert(episode_id, Arc::new(Mutex::new(ballot_box)));
        Ok(())
    }

    /// Accepts `player_id`'s vote for `choice`, replacing any earlier vote by
    /// the same player.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::UnknownEpisode`, `VoteError::WindowClosed` or
    /// `VoteError::InvalidChoice` for rejected submissions, or a persistence
    /// error.
    #[instrument(skip(self))]
    pub async fn submit(&self, episode_id: Uuid, player_id: &str, choice: &str) -> Result<(), VoteError> {
        let window = self.window(episode_id).await?;
        let mut ballot_box = window.lock().await;

        ballot_box.cast(player_id, choice, self.clock.as_ref())?;
        match self.persist(&mut ballot_box).await {
            Err(e) if e.is_conflict() => {
                warn!(%episode_id, "ballot stream moved underneath us, reloading");
                self.reload(&mut ballot_box).await?;
                ballot_box.cast(player_id, choice, self.clock.as_ref())?;
                self.persist(&mut ballot_box).await?;
            }
            result => result?,
        }

        debug!(%episode_id, player_id, choice, "vote counted");
        Ok(())
    }

    /// Resolves the window into a tally. Calling it again returns the cached
    /// tally.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::UnknownEpisode` if no window was opened,
    /// `VoteError::WindowClosed` if it was released, or a persistence error.
    #[instrument(skip(self))]
    pub async fn close(&self, episode_id: Uuid) -> Result<Tally, VoteError> {
        let window = self.window(episode_id).await?;
        let mut ballot_box = window.lock().await;

        if let Some(cached) = ballot_box.tally() {
            return Ok(cached.clone());
        }
        let tally = ballot_box.close(&self.policy, self.clock.as_ref())?;
        self.persist(&mut ballot_box).await?;

        info!(
            %episode_id,
            total_votes = tally.total_votes,
            winner = tally.winner().unwrap_or("none"),
            "vote window closed"
        );
        Ok(tally)
    }

    /// Drops the window without producing a tally. Releasing a window that
    /// is already closed or released does nothing.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::UnknownEpisode` if no window was opened, or a
    /// persistence error.
    #[instrument(skip(self))]
    pub async fn release(&self, episode_id: Uuid) -> Result<(), VoteError> {
        let window = self.window(episode_id).await?;
        let mut ballot_box = window.lock().await;

        if ballot_box.release(self.clock.as_ref()) {
            self.persist(&mut ballot_box).await?;
            info!(%episode_id, "vote window released");
        }
        Ok(())
    }

    /// Drops the in-memory window of a finished episode. Its stream stays in
    /// the event store; later calls for the episode see `UnknownEpisode`.
    /// Returns whether a window was held.
    #[instrument(skip(self))]
    pub async fn forget(&self, episode_id: Uuid) -> bool {
        let forgotten = self.windows.write().await.remove(&episode_id).is_some();
        if forgotten {
            debug!(%episode_id, "vote window forgotten");
        }
        forgotten
    }

    /// Snapshots the counted votes of a window.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::UnknownEpisode` if no window was opened.
    pub async fn ballot(&self, episode_id: Uuid) -> Result<BallotSnapshot, VoteError> {
        let window = self.window(episode_id).await?;
        let ballot_box = window.lock().await;
        Ok(ballot_box.snapshot(self.clock.now()))
    }
}

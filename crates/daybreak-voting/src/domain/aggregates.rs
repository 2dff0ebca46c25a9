//! The ballot box aggregate: one vote window for one episode.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::event::EventMetadata;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    BallotBoxEvent, BallotBoxEventKind, VoteCast, WindowClosed, WindowOpened, WindowReleased,
};
use super::tally::{self, Ballot, Tally, VotingPolicy};
use crate::error::VoteError;

/// Lifecycle of a vote window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    /// No window has been opened on this stream.
    Unopened,
    /// Accepting votes until the deadline.
    Open,
    /// Resolved into a tally.
    Closed,
    /// Dropped without a tally.
    Released,
}

/// Read model of a window's current counted votes.
#[derive(Debug, Clone, Serialize)]
pub struct BallotSnapshot {
    /// The episode voted on.
    pub episode_id: Uuid,
    /// Window status at snapshot time. An `Open` window past its deadline
    /// reports `Closed`.
    pub status: WindowStatus,
    /// Valid choice keys.
    pub choices: Vec<String>,
    /// When the window stops accepting votes.
    pub closes_at: Option<DateTime<Utc>>,
    /// Counted votes per choice.
    pub counts: BTreeMap<String, u32>,
    /// Number of counted votes.
    pub total_votes: u32,
    /// The resolved tally, once closed.
    pub tally: Option<Tally>,
}

/// A vote window. Holds at most one counted ballot per player.
#[derive(Debug, Clone)]
pub struct BallotBox {
    id: Uuid,
    version: i64,
    episode_id: Uuid,
    status: WindowStatus,
    choices: Vec<String>,
    opened_at: Option<DateTime<Utc>>,
    closes_at: Option<DateTime<Utc>>,
    ballots: HashMap<String, Ballot>,
    next_arrival: u64,
    tally: Option<Tally>,
    uncommitted_events: Vec<BallotBoxEvent>,
}

impl BallotBox {
    /// Creates an unopened ballot box on stream `id`.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            episode_id: Uuid::nil(),
            status: WindowStatus::Unopened,
            choices: Vec::new(),
            opened_at: None,
            closes_at: None,
            ballots: HashMap::new(),
            next_arrival: 0,
            tally: None,
            uncommitted_events: Vec::new(),
        }
    }

    /// The episode voted on (nil until opened).
    #[must_use]
    pub fn episode_id(&self) -> Uuid {
        self.episode_id
    }

    /// Current lifecycle status, ignoring the deadline.
    #[must_use]
    pub fn status(&self) -> WindowStatus {
        self.status
    }

    /// When the window opened.
    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// When the window stops accepting votes.
    #[must_use]
    pub fn closes_at(&self) -> Option<DateTime<Utc>> {
        self.closes_at
    }

    /// The cached tally, once closed.
    #[must_use]
    pub fn tally(&self) -> Option<&Tally> {
        self.tally.as_ref()
    }

    /// The counted ballot of `player_id`, if any.
    #[must_use]
    pub fn ballot_of(&self, player_id: &str) -> Option<&Ballot> {
        self.ballots.get(player_id)
    }

    /// Whether a vote submitted at `now` would be accepted.
    #[must_use]
    pub fn is_accepting(&self, now: DateTime<Utc>) -> bool {
        self.status == WindowStatus::Open && self.closes_at.is_some_and(|deadline| now < deadline)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn push(&mut self, kind: BallotBoxEventKind, event_type: &str, correlation_id: Uuid, clock: &dyn Clock) {
        let metadata = EventMetadata::new(
            event_type,
            self.id,
            self.next_sequence_number(),
            correlation_id,
            clock,
        );
        self.uncommitted_events.push(BallotBoxEvent { metadata, kind });
    }

    /// Opens the window for `duration` from now.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::AlreadyOpen` if this stream already holds a window.
    pub fn open(
        &mut self,
        episode_id: Uuid,
        choices: Vec<String>,
        duration: chrono::Duration,
        clock: &dyn Clock,
    ) -> Result<(), VoteError> {
        if self.status != WindowStatus::Unopened || !self.uncommitted_events.is_empty() {
            return Err(VoteError::AlreadyOpen(episode_id));
        }
        let opened_at = clock.now();
        let kind = BallotBoxEventKind::WindowOpened(WindowOpened {
            ballot_box_id: self.id,
            episode_id,
            choices,
            opened_at,
            closes_at: opened_at + duration,
        });
        self.push(kind, "vote.window_opened", episode_id, clock);
        Ok(())
    }

    /// Records a vote from `player_id`, replacing that player's earlier one.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::WindowClosed` when the window is not open or its
    /// deadline has passed, and `VoteError::InvalidChoice` for a choice that
    /// was not offered.
    pub fn cast(&mut self, player_id: &str, choice: &str, clock: &dyn Clock) -> Result<(), VoteError> {
        let now = clock.now();
        if !self.is_accepting(now) {
            return Err(VoteError::WindowClosed(self.episode_id));
        }
        if !self.choices.is_empty() && !self.choices.iter().any(|c| c == choice) {
            return Err(VoteError::InvalidChoice {
                episode_id: self.episode_id,
                choice: choice.to_owned(),
            });
        }
        let kind = BallotBoxEventKind::VoteCast(VoteCast {
            player_id: player_id.to_owned(),
            choice: choice.to_owned(),
            submitted_at: now,
            arrival: self.next_arrival,
        });
        self.push(kind, "vote.cast", self.episode_id, clock);
        Ok(())
    }

    /// Resolves the window. A closed window returns its cached tally without
    /// producing an event.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::WindowClosed` for a released window and
    /// `VoteError::UnknownEpisode` for an unopened one.
    pub fn close(&mut self, policy: &VotingPolicy, clock: &dyn Clock) -> Result<Tally, VoteError> {
        match self.status {
            WindowStatus::Closed => {
                if let Some(cached) = &self.tally {
                    return Ok(cached.clone());
                }
                Err(VoteError::WindowClosed(self.episode_id))
            }
            WindowStatus::Released => Err(VoteError::WindowClosed(self.episode_id)),
            WindowStatus::Unopened => Err(VoteError::UnknownEpisode(self.episode_id)),
            WindowStatus::Open => {
                let tally = tally::resolve(
                    self.episode_id,
                    &self.choices,
                    self.ballots.values(),
                    policy,
                );
                let kind = BallotBoxEventKind::WindowClosed(WindowClosed {
                    tally: tally.clone(),
                });
                self.push(kind, "vote.window_closed", self.episode_id, clock);
                Ok(tally)
            }
        }
    }

    /// Drops an open window without a tally. Returns `false` when there was
    /// nothing to release.
    pub fn release(&mut self, clock: &dyn Clock) -> bool {
        if self.status != WindowStatus::Open {
            return false;
        }
        let kind = BallotBoxEventKind::WindowReleased(WindowReleased {
            released_at: clock.now(),
        });
        self.push(kind, "vote.window_released", self.episode_id, clock);
        true
    }

    /// Applies and clears the uncommitted events once they are persisted.
    pub fn mark_committed(&mut self) {
        let events = std::mem::take(&mut self.uncommitted_events);
        for event in &events {
            self.apply(event);
        }
    }

    /// Snapshots the counted votes as of `now`.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> BallotSnapshot {
        let mut counts: BTreeMap<String, u32> =
            self.choices.iter().map(|c| (c.clone(), 0)).collect();
        for ballot in self.ballots.values() {
            *counts.entry(ballot.choice.clone()).or_insert(0) += 1;
        }
        let status = if self.status == WindowStatus::Open && !self.is_accepting(now) {
            WindowStatus::Closed
        } else {
            self.status
        };
        #[allow(clippy::cast_possible_truncation)]
        let total_votes = self.ballots.len() as u32;
        BallotSnapshot {
            episode_id: self.episode_id,
            status,
            choices: self.choices.clone(),
            closes_at: self.closes_at,
            counts,
            total_votes,
            tally: self.tally.clone(),
        }
    }
}

impl AggregateRoot for BallotBox {
    type Event = BallotBoxEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            BallotBoxEventKind::WindowOpened(payload) => {
                self.episode_id = payload.episode_id;
                self.choices.clone_from(&payload.choices);
                self.opened_at = Some(payload.opened_at);
                self.closes_at = Some(payload.closes_at);
                self.status = WindowStatus::Open;
            }
            BallotBoxEventKind::VoteCast(payload) => {
                let ballot = Ballot {
                    player_id: payload.player_id.clone(),
                    choice: payload.choice.clone(),
                    submitted_at: payload.submitted_at,
                    arrival: payload.arrival,
                };
                let replaces = self.ballots.get(&payload.player_id).is_none_or(|current| {
                    (ballot.submitted_at, ballot.arrival) >= (current.submitted_at, current.arrival)
                });
                if replaces {
                    self.ballots.insert(payload.player_id.clone(), ballot);
                }
                self.next_arrival = self.next_arrival.max(payload.arrival + 1);
            }
            BallotBoxEventKind::WindowClosed(payload) => {
                self.tally = Some(payload.tally.clone());
                self.status = WindowStatus::Closed;
            }
            BallotBoxEventKind::WindowReleased(_) => {
                self.status = WindowStatus::Released;
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

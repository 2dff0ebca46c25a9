//! The `Episode` aggregate.

use chrono::{DateTime, Utc};
use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::event::EventMetadata;
use daybreak_generation::{Choice, ContentJob, JobKind};
use daybreak_voting::Tally;
use uuid::Uuid;

use super::events::{
    ContentSettled, EpisodeAborted, EpisodeCompleted, EpisodeEvent, EpisodeEventKind,
    EpisodeFailed, EpisodeScheduled, NarrativeRequested, OutcomeResolved, VoteClosed, VoteOpened,
};
use super::outcome::{NpcLine, Outcome, PublishedAsset};
use super::state::EpisodeState;
use crate::error::EpisodeError;

/// One day of a session. Owned by its runner until terminal.
#[derive(Debug, Clone)]
pub struct Episode {
    /// Episode identifier; also the stream id.
    pub id: Uuid,
    /// The owning session.
    pub session_id: Uuid,
    /// Day number within the session.
    pub sequence: u64,
    pub(crate) version: i64,
    state: EpisodeState,
    /// World version read at episode start.
    pub world_version_at_start: i64,
    /// Latest world version committed by this episode.
    pub world_version: Option<i64>,
    /// The story text.
    pub narrative: Option<String>,
    /// The choices on offer.
    pub choices: Vec<Choice>,
    /// Character lines published with the story.
    pub npc_lines: Vec<NpcLine>,
    /// The ballot box stream.
    pub ballot_box_id: Option<Uuid>,
    /// When voting opened.
    pub vote_opened_at: Option<DateTime<Utc>>,
    /// When voting closes.
    pub vote_closes_at: Option<DateTime<Utc>>,
    /// When voting was closed.
    pub vote_closed_at: Option<DateTime<Utc>>,
    /// The resolved tally.
    pub tally: Option<Tally>,
    /// The resolved outcome.
    pub outcome: Option<Outcome>,
    /// Final records of every job dispatched for this episode.
    pub jobs: Vec<ContentJob>,
    /// Generated assets.
    pub assets: Vec<PublishedAsset>,
    /// Content kinds that produced nothing.
    pub missing: Vec<JobKind>,
    /// Tomorrow's teaser.
    pub teaser: Option<String>,
    /// Failure or abort reason.
    pub reason: Option<String>,
    /// When the episode completed.
    pub completed_at: Option<DateTime<Utc>>,
    uncommitted_events: Vec<EpisodeEvent>,
}

impl Episode {
    /// An empty episode, before its `scheduled` event.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            session_id: Uuid::nil(),
            sequence: 0,
            version: 0,
            state: EpisodeState::Idle,
            world_version_at_start: 0,
            world_version: None,
            narrative: None,
            choices: Vec::new(),
            npc_lines: Vec::new(),
            ballot_box_id: None,
            vote_opened_at: None,
            vote_closes_at: None,
            vote_closed_at: None,
            tally: None,
            outcome: None,
            jobs: Vec::new(),
            assets: Vec::new(),
            missing: Vec::new(),
            teaser: None,
            reason: None,
            completed_at: None,
            uncommitted_events: Vec::new(),
        }
    }

    /// Current state, including uncommitted transitions.
    #[must_use]
    pub fn state(&self) -> EpisodeState {
        self.uncommitted_events
            .iter()
            .rev()
            .find_map(|e| target_state(&e.kind))
            .unwrap_or(self.state)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn push(&mut self, kind: EpisodeEventKind, clock: &dyn Clock) {
        let metadata = EventMetadata::new(
            kind.event_type(),
            self.id,
            self.next_sequence_number(),
            self.id,
            clock,
        );
        self.uncommitted_events.push(EpisodeEvent { metadata, kind });
    }

    fn transition(&self, to: EpisodeState) -> Result<(), EpisodeError> {
        let from = self.state();
        if from.is_terminal() {
            return Err(EpisodeError::Terminal(self.id));
        }
        if !from.can_transition_to(to) {
            return Err(EpisodeError::InvalidTransition { from, to });
        }
        Ok(())
    }

    /// Records the episode's creation in `Idle`.
    ///
    /// # Errors
    ///
    /// Returns `EpisodeError::InvalidTransition` if the episode already
    /// exists.
    pub fn schedule(
        &mut self,
        session_id: Uuid,
        sequence: u64,
        world_version: i64,
        clock: &dyn Clock,
    ) -> Result<(), EpisodeError> {
        if self.version != 0 || !self.uncommitted_events.is_empty() {
            return Err(EpisodeError::InvalidTransition {
                from: self.state(),
                to: EpisodeState::Idle,
            });
        }
        let kind = EpisodeEventKind::EpisodeScheduled(EpisodeScheduled {
            episode_id: self.id,
            session_id,
            sequence,
            world_version,
        });
        self.push(kind, clock);
        Ok(())
    }

    /// `Idle → NarrativePending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn request_narrative(&mut self, job_ids: Vec<Uuid>, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::NarrativePending)?;
        self.push(
            EpisodeEventKind::NarrativeRequested(NarrativeRequested { job_ids }),
            clock,
        );
        Ok(())
    }

    /// `NarrativePending → VoteOpen`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn open_vote(&mut self, opened: VoteOpened, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::VoteOpen)?;
        self.push(EpisodeEventKind::VoteOpened(opened), clock);
        Ok(())
    }

    /// `VoteOpen → Resolving`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn close_vote(&mut self, tally: Tally, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::Resolving)?;
        let kind = EpisodeEventKind::VoteClosed(VoteClosed {
            tally,
            closed_at: clock.now(),
        });
        self.push(kind, clock);
        Ok(())
    }

    /// `Resolving → ContentPending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn resolve_outcome(
        &mut self,
        outcome: Outcome,
        world_version: i64,
        clock: &dyn Clock,
    ) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::ContentPending)?;
        let kind = EpisodeEventKind::OutcomeResolved(OutcomeResolved {
            outcome,
            world_version,
        });
        self.push(kind, clock);
        Ok(())
    }

    /// `ContentPending → Publishing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn settle_content(&mut self, settled: ContentSettled, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::Publishing)?;
        self.push(EpisodeEventKind::ContentSettled(settled), clock);
        Ok(())
    }

    /// `Publishing → Completed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn complete(&mut self, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::Completed)?;
        let kind = EpisodeEventKind::EpisodeCompleted(EpisodeCompleted {
            completed_at: clock.now(),
        });
        self.push(kind, clock);
        Ok(())
    }

    /// Any non-terminal state `→ Failed`.
    ///
    /// # Errors
    ///
    /// Returns `EpisodeError::Terminal` if the episode already ended.
    pub fn fail(&mut self, reason: impl Into<String>, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::Failed)?;
        let kind = EpisodeEventKind::EpisodeFailed(EpisodeFailed {
            from: self.state(),
            reason: reason.into(),
        });
        self.push(kind, clock);
        Ok(())
    }

    /// `Idle | NarrativePending | VoteOpen → Aborted`.
    ///
    /// # Errors
    ///
    /// Returns `EpisodeError::InvalidTransition` once resolution has begun.
    pub fn abort(&mut self, reason: impl Into<String>, clock: &dyn Clock) -> Result<(), EpisodeError> {
        self.transition(EpisodeState::Aborted)?;
        let kind = EpisodeEventKind::EpisodeAborted(EpisodeAborted {
            from: self.state(),
            reason: reason.into(),
        });
        self.push(kind, clock);
        Ok(())
    }

    /// Applies and clears the uncommitted events once they are persisted.
    pub fn mark_committed(&mut self) {
        let events = std::mem::take(&mut self.uncommitted_events);
        for event in &events {
            self.apply(event);
        }
    }
}

fn target_state(kind: &EpisodeEventKind) -> Option<EpisodeState> {
    match kind {
        EpisodeEventKind::EpisodeScheduled(_) => None,
        EpisodeEventKind::NarrativeRequested(_) => Some(EpisodeState::NarrativePending),
        EpisodeEventKind::VoteOpened(_) => Some(EpisodeState::VoteOpen),
        EpisodeEventKind::VoteClosed(_) => Some(EpisodeState::Resolving),
        EpisodeEventKind::OutcomeResolved(_) => Some(EpisodeState::ContentPending),
        EpisodeEventKind::ContentSettled(_) => Some(EpisodeState::Publishing),
        EpisodeEventKind::EpisodeCompleted(_) => Some(EpisodeState::Completed),
        EpisodeEventKind::EpisodeFailed(_) => Some(EpisodeState::Failed),
        EpisodeEventKind::EpisodeAborted(_) => Some(EpisodeState::Aborted),
    }
}

impl AggregateRoot for Episode {
    type Event = EpisodeEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            EpisodeEventKind::EpisodeScheduled(payload) => {
                self.session_id = payload.session_id;
                self.sequence = payload.sequence;
                self.world_version_at_start = payload.world_version;
            }
            EpisodeEventKind::NarrativeRequested(_) => {}
            EpisodeEventKind::VoteOpened(payload) => {
                self.narrative = Some(payload.narrative.clone());
                self.choices.clone_from(&payload.choices);
                self.npc_lines.clone_from(&payload.npc_lines);
                self.jobs.extend(payload.jobs.iter().cloned());
                self.ballot_box_id = Some(payload.ballot_box_id);
                self.vote_opened_at = Some(payload.opened_at);
                self.vote_closes_at = Some(payload.closes_at);
            }
            EpisodeEventKind::VoteClosed(payload) => {
                self.tally = Some(payload.tally.clone());
                self.vote_closed_at = Some(payload.closed_at);
            }
            EpisodeEventKind::OutcomeResolved(payload) => {
                self.outcome = Some(payload.outcome.clone());
                self.world_version = Some(payload.world_version);
            }
            EpisodeEventKind::ContentSettled(payload) => {
                self.jobs.extend(payload.jobs.iter().cloned());
                self.assets.clone_from(&payload.assets);
                self.missing.clone_from(&payload.missing);
                self.teaser.clone_from(&payload.teaser);
                if payload.world_version.is_some() {
                    self.world_version = payload.world_version;
                }
            }
            EpisodeEventKind::EpisodeCompleted(payload) => {
                self.completed_at = Some(payload.completed_at);
            }
            EpisodeEventKind::EpisodeFailed(payload) => {
                self.reason = Some(payload.reason.clone());
            }
            EpisodeEventKind::EpisodeAborted(payload) => {
                self.reason = Some(payload.reason.clone());
            }
        }
        if let Some(state) = target_state(&event.kind) {
            self.state = state;
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

#[cfg(test)]
mod tests {
    use daybreak_test_support::{FixedClock, fixed_time};

    use super::*;

    fn scheduled(clock: &FixedClock) -> Episode {
        let mut episode = Episode::new(Uuid::new_v4());
        episode.schedule(Uuid::new_v4(), 1, 1, clock).unwrap();
        episode.mark_committed();
        episode
    }

    #[test]
    fn test_schedule_starts_idle_at_version_one() {
        let clock = FixedClock(fixed_time());

        let episode = scheduled(&clock);

        assert_eq!(episode.state(), EpisodeState::Idle);
        assert_eq!(episode.version(), 1);
        assert_eq!(episode.sequence, 1);
        assert_eq!(episode.world_version_at_start, 1);
    }

    #[test]
    fn test_skipping_to_vote_closed_is_invalid() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut episode = scheduled(&clock);
        let tally = Tally {
            episode_id: episode.id,
            counts: std::collections::BTreeMap::new(),
            total_votes: 0,
            outcome: daybreak_voting::TallyOutcome::NoConsensus,
        };

        // Act
        let result = episode.close_vote(tally, &clock);

        // Assert
        assert!(matches!(
            result,
            Err(EpisodeError::InvalidTransition {
                from: EpisodeState::Idle,
                to: EpisodeState::Resolving
            })
        ));
        assert!(episode.uncommitted_events().is_empty());
    }

    #[test]
    fn test_uncommitted_transition_is_visible_in_state() {
        let clock = FixedClock(fixed_time());
        let mut episode = scheduled(&clock);

        episode.request_narrative(vec![Uuid::new_v4()], &clock).unwrap();

        assert_eq!(episode.state(), EpisodeState::NarrativePending);
        assert_eq!(episode.uncommitted_events()[0].metadata.sequence_number, 2);
    }

    #[test]
    fn test_fail_records_state_failed_from() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut episode = scheduled(&clock);
        episode.request_narrative(vec![], &clock).unwrap();
        episode.mark_committed();

        // Act
        episode.fail("narrative generation failed", &clock).unwrap();

        // Assert
        match &episode.uncommitted_events()[0].kind {
            EpisodeEventKind::EpisodeFailed(payload) => {
                assert_eq!(payload.from, EpisodeState::NarrativePending);
            }
            other => panic!("unexpected event {other:?}"),
        }
        episode.mark_committed();
        assert_eq!(episode.state(), EpisodeState::Failed);
        assert_eq!(episode.reason.as_deref(), Some("narrative generation failed"));
    }

    #[test]
    fn test_terminal_episode_rejects_every_command() {
        let clock = FixedClock(fixed_time());
        let mut episode = scheduled(&clock);
        episode.abort("session ended", &clock).unwrap();
        episode.mark_committed();

        assert!(matches!(episode.fail("late", &clock), Err(EpisodeError::Terminal(_))));
        assert!(matches!(
            episode.request_narrative(vec![], &clock),
            Err(EpisodeError::Terminal(_))
        ));
        assert_eq!(episode.state(), EpisodeState::Aborted);
    }

    #[test]
    fn test_abort_after_resolution_began_is_invalid() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut episode = scheduled(&clock);
        episode.request_narrative(vec![], &clock).unwrap();
        episode
            .open_vote(
                VoteOpened {
                    narrative: "A signal.".to_owned(),
                    choices: vec![Choice::new("A", "answer")],
                    npc_lines: vec![],
                    jobs: vec![],
                    ballot_box_id: Uuid::new_v4(),
                    opened_at: fixed_time(),
                    closes_at: fixed_time(),
                },
                &clock,
            )
            .unwrap();
        let tally = Tally {
            episode_id: episode.id,
            counts: std::collections::BTreeMap::new(),
            total_votes: 0,
            outcome: daybreak_voting::TallyOutcome::NoConsensus,
        };
        episode.close_vote(tally, &clock).unwrap();
        episode.mark_committed();

        // Act
        let result = episode.abort("too late", &clock);

        // Assert
        assert!(matches!(
            result,
            Err(EpisodeError::InvalidTransition {
                from: EpisodeState::Resolving,
                to: EpisodeState::Aborted
            })
        ));
        assert_eq!(episode.narrative.as_deref(), Some("A signal."));
    }
}

//! Aggregate roots for the Session context.

use chrono::{DateTime, Utc};
use daybreak_core::aggregate::AggregateRoot;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::event::EventMetadata;
use daybreak_episode::EpisodeState;
use uuid::Uuid;

use super::character::Character;
use super::events::{
    CharacterAdded, EpisodeFinished, EpisodeStarted, SessionArchived, SessionCreated,
    SessionEvent, SessionEventKind,
};

/// The event stream holding a session's roster and episode sequence. The
/// session id itself keys the world state stream.
#[must_use]
pub fn stream_id(session_id: Uuid) -> Uuid {
    Uuid::new_v5(&session_id, b"daybreak.session")
}

/// The aggregate root for one game instance.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub version: i64,
    /// Whether the session was created.
    pub created: bool,
    /// The setting fed to narrative generation.
    pub setting: String,
    /// Crew member names.
    pub crew: Vec<String>,
    /// Characters taking part.
    pub characters: Vec<Character>,
    /// The episode currently live, if any.
    pub active_episode: Option<Uuid>,
    /// Day number of the latest started episode.
    pub last_sequence: u64,
    /// Terminal state of the latest finished episode.
    pub last_episode_state: Option<EpisodeState>,
    /// When the session ended.
    pub archived_at: Option<DateTime<Utc>>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<SessionEvent>,
}

impl Session {
    /// Creates an empty session, before its `created` event.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            created: false,
            setting: String::new(),
            crew: Vec::new(),
            characters: Vec::new(),
            active_episode: None,
            last_sequence: 0,
            last_episode_state: None,
            archived_at: None,
            uncommitted_events: Vec::new(),
        }
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Looks up a character by id.
    #[must_use]
    pub fn character(&self, id: Uuid) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn push(&mut self, kind: SessionEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let metadata = EventMetadata::new(
            kind.event_type(),
            stream_id(self.id),
            self.next_sequence_number(),
            correlation_id,
            clock,
        );
        self.uncommitted_events.push(SessionEvent { metadata, kind });
    }

    fn is_created(&self) -> bool {
        self.created
            || self
                .uncommitted_events
                .iter()
                .any(|e| matches!(e.kind, SessionEventKind::SessionCreated(_)))
    }

    fn knows_character(&self, id: Uuid) -> bool {
        self.character(id).is_some()
            || self.uncommitted_events.iter().any(|e| {
                matches!(&e.kind, SessionEventKind::CharacterAdded(added) if added.character.id == id)
            })
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.is_created() {
            return Err(DomainError::AggregateNotFound(self.id));
        }
        if self.is_archived() {
            return Err(DomainError::Validation(format!(
                "session {} is archived",
                self.id
            )));
        }
        Ok(())
    }

    /// Records the session's creation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the session already exists or
    /// the setting is blank.
    pub fn create(
        &mut self,
        setting: String,
        crew: Vec<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.is_created() {
            return Err(DomainError::Validation(format!(
                "session {} already exists",
                self.id
            )));
        }
        if setting.trim().is_empty() {
            return Err(DomainError::Validation("setting must not be empty".into()));
        }
        self.push(
            SessionEventKind::SessionCreated(SessionCreated {
                session_id: self.id,
                setting,
                crew,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Adds a character. Relationships may only point at characters already
    /// in the session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an unknown session and
    /// `DomainError::Validation` for an archived session, a blank name, a
    /// duplicate id or a dangling relationship.
    pub fn add_character(
        &mut self,
        id: Uuid,
        name: String,
        personality: serde_json::Value,
        relationships: Vec<Uuid>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_live()?;
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "character name must not be empty".into(),
            ));
        }
        if self.knows_character(id) {
            return Err(DomainError::Validation(format!(
                "character {id} already exists"
            )));
        }
        if let Some(dangling) = relationships
            .iter()
            .find(|other| **other == id || !self.knows_character(**other))
        {
            return Err(DomainError::Validation(format!(
                "character {id} cannot relate to {dangling}"
            )));
        }
        let character = Character {
            id,
            session_id: self.id,
            name,
            personality,
            relationships,
        };
        self.push(
            SessionEventKind::CharacterAdded(CharacterAdded { character }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Starts the next episode and returns its day number.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an unknown session and
    /// `DomainError::Validation` if the session is archived or another
    /// episode is still live.
    pub fn start_episode(
        &mut self,
        episode_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<u64, DomainError> {
        self.ensure_live()?;
        if let Some(active) = self.active_episode {
            return Err(DomainError::Validation(format!(
                "episode {active} is still live"
            )));
        }
        let sequence = self.last_sequence + 1;
        self.push(
            SessionEventKind::EpisodeStarted(EpisodeStarted {
                episode_id,
                sequence,
            }),
            correlation_id,
            clock,
        );
        Ok(sequence)
    }

    /// Records that the live episode reached `state`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `episode_id` is not the live
    /// episode or `state` is not terminal.
    pub fn finish_episode(
        &mut self,
        episode_id: Uuid,
        state: EpisodeState,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.active_episode != Some(episode_id) {
            return Err(DomainError::Validation(format!(
                "episode {episode_id} is not live in session {}",
                self.id
            )));
        }
        if !state.is_terminal() {
            return Err(DomainError::Validation(format!(
                "episode {episode_id} cannot finish in state {state}"
            )));
        }
        self.push(
            SessionEventKind::EpisodeFinished(EpisodeFinished {
                episode_id,
                sequence: self.last_sequence,
                state,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Ends the session. Returns `false` if it had already ended.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an unknown session.
    pub fn archive(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<bool, DomainError> {
        if !self.is_created() {
            return Err(DomainError::AggregateNotFound(self.id));
        }
        if self.is_archived() {
            return Ok(false);
        }
        self.push(
            SessionEventKind::SessionArchived(SessionArchived {
                archived_at: clock.now(),
            }),
            correlation_id,
            clock,
        );
        Ok(true)
    }

    /// Applies the uncommitted events after a successful append.
    pub fn mark_committed(&mut self) {
        let events = std::mem::take(&mut self.uncommitted_events);
        for event in &events {
            self.apply(event);
        }
    }
}

impl AggregateRoot for Session {
    type Event = SessionEvent;

    fn aggregate_id(&self) -> Uuid {
        stream_id(self.id)
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            SessionEventKind::SessionCreated(created) => {
                self.created = true;
                self.setting.clone_from(&created.setting);
                self.crew.clone_from(&created.crew);
            }
            SessionEventKind::CharacterAdded(added) => {
                self.characters.push(added.character.clone());
            }
            SessionEventKind::EpisodeStarted(started) => {
                self.active_episode = Some(started.episode_id);
                self.last_sequence = started.sequence;
            }
            SessionEventKind::EpisodeFinished(finished) => {
                if self.active_episode == Some(finished.episode_id) {
                    self.active_episode = None;
                }
                self.last_episode_state = Some(finished.state);
            }
            SessionEventKind::SessionArchived(archived) => {
                self.archived_at = Some(archived.archived_at);
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

#[cfg(test)]
mod tests {
    use daybreak_core::event::DomainEvent;
    use daybreak_test_support::{FixedClock, fixed_time};

    use super::*;

    fn created() -> Session {
        let clock = FixedClock(fixed_time());
        let mut session = Session::new(Uuid::new_v4());
        session
            .create(
                "A survey ship adrift near a dead star.".to_owned(),
                vec!["Vega".to_owned()],
                Uuid::new_v4(),
                &clock,
            )
            .unwrap();
        session.mark_committed();
        session
    }

    #[test]
    fn test_stream_id_is_stable_and_distinct_from_session_id() {
        let session_id = Uuid::new_v4();

        assert_eq!(stream_id(session_id), stream_id(session_id));
        assert_ne!(stream_id(session_id), session_id);
    }

    #[test]
    fn test_create_produces_created_event() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut session = Session::new(Uuid::new_v4());

        // Act
        session
            .create("Deep space".to_owned(), Vec::new(), Uuid::new_v4(), &clock)
            .unwrap();

        // Assert
        assert_eq!(session.uncommitted_events().len(), 1);
        let event = &session.uncommitted_events()[0];
        assert_eq!(event.event_type(), "session.created");
        assert_eq!(event.metadata().aggregate_id, stream_id(session.id));
    }

    #[test]
    fn test_create_twice_is_rejected() {
        let clock = FixedClock(fixed_time());
        let mut session = created();

        let result = session.create("Again".to_owned(), Vec::new(), Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_blank_setting_is_rejected() {
        let clock = FixedClock(fixed_time());
        let mut session = Session::new(Uuid::new_v4());

        let result = session.create("  ".to_owned(), Vec::new(), Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_relationships_may_point_at_characters_added_in_the_same_batch() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut session = created();
        let okafor = Uuid::new_v4();
        let imani = Uuid::new_v4();

        // Act
        session
            .add_character(okafor, "Dr. Okafor".to_owned(), serde_json::Value::Null, Vec::new(), Uuid::new_v4(), &clock)
            .unwrap();
        session
            .add_character(imani, "Imani".to_owned(), serde_json::Value::Null, vec![okafor], Uuid::new_v4(), &clock)
            .unwrap();
        session.mark_committed();

        // Assert
        assert_eq!(session.characters.len(), 2);
        assert_eq!(session.character(imani).unwrap().relationships, vec![okafor]);
    }

    #[test]
    fn test_dangling_relationship_is_rejected() {
        let clock = FixedClock(fixed_time());
        let mut session = created();

        let result = session.add_character(
            Uuid::new_v4(),
            "Imani".to_owned(),
            serde_json::Value::Null,
            vec![Uuid::new_v4()],
            Uuid::new_v4(),
            &clock,
        );

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_add_character_to_unknown_session_is_not_found() {
        let clock = FixedClock(fixed_time());
        let mut session = Session::new(Uuid::new_v4());

        let result = session.add_character(
            Uuid::new_v4(),
            "Imani".to_owned(),
            serde_json::Value::Null,
            Vec::new(),
            Uuid::new_v4(),
            &clock,
        );

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }

    #[test]
    fn test_episode_sequence_increments_across_finished_episodes() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut session = created();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        // Act
        let day_one = session.start_episode(first, first, &clock).unwrap();
        session.mark_committed();
        session
            .finish_episode(first, EpisodeState::Failed, first, &clock)
            .unwrap();
        session.mark_committed();
        let day_two = session.start_episode(second, second, &clock).unwrap();
        session.mark_committed();

        // Assert
        assert_eq!(day_one, 1);
        assert_eq!(day_two, 2);
        assert_eq!(session.active_episode, Some(second));
        assert_eq!(session.last_episode_state, Some(EpisodeState::Failed));
    }

    #[test]
    fn test_second_live_episode_is_rejected() {
        let clock = FixedClock(fixed_time());
        let mut session = created();
        session.start_episode(Uuid::new_v4(), Uuid::new_v4(), &clock).unwrap();
        session.mark_committed();

        let result = session.start_episode(Uuid::new_v4(), Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_finish_requires_terminal_state() {
        let clock = FixedClock(fixed_time());
        let mut session = created();
        let episode_id = Uuid::new_v4();
        session.start_episode(episode_id, episode_id, &clock).unwrap();
        session.mark_committed();

        let result = session.finish_episode(episode_id, EpisodeState::VoteOpen, episode_id, &clock);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_archived_session_starts_no_episodes() {
        // Arrange
        let clock = FixedClock(fixed_time());
        let mut session = created();
        assert!(session.archive(Uuid::new_v4(), &clock).unwrap());
        session.mark_committed();

        // Act
        let again = session.archive(Uuid::new_v4(), &clock).unwrap();
        let result = session.start_episode(Uuid::new_v4(), Uuid::new_v4(), &clock);

        // Assert
        assert!(!again);
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(session.archived_at, Some(fixed_time()));
    }
}

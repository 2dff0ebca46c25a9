//! The session scheduler.
//!
//! Each scheduled session owns one timer task. Every episode start, timed or
//! manual, goes through [`SessionScheduler::trigger`], which reserves the
//! session's single live-episode slot before touching storage: a trigger
//! that finds the slot taken is dropped, never queued.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use daybreak_core::cancel::{CancellationSource, CancellationToken};
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::EventRepository;
use daybreak_episode::application::command_handlers::handle_interrupt;
use daybreak_episode::{EpisodeContext, EpisodeRunner, EpisodeState, NpcDescriptor};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, instrument, warn};
use uuid::Uuid;

use super::cadence::Cadence;
use super::command_handlers::{handle_archive_session, load, persist};
use crate::domain::aggregates::Session;
use crate::domain::commands::ArchiveSession;
use crate::error::SchedulerError;

/// What a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A new episode started.
    Started {
        /// The new episode.
        episode_id: Uuid,
    },
    /// Another episode of the session is still live.
    Dropped {
        /// The live episode.
        active: Uuid,
    },
}

struct SessionTimer {
    cadence: Cadence,
    task: JoinHandle<()>,
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct LiveEpisode {
    episode_id: Uuid,
    cancel: CancellationSource,
}

#[derive(Default)]
struct Slot {
    timer: Option<SessionTimer>,
    live: Option<LiveEpisode>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.timer.is_none() && self.live.is_none()
    }
}

struct Inner {
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    runner: Arc<EpisodeRunner>,
    slots: Mutex<HashMap<Uuid, Slot>>,
}

/// Times episode starts per session and enforces one live episode per
/// session.
#[derive(Clone)]
pub struct SessionScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionScheduler").finish_non_exhaustive()
    }
}

impl SessionScheduler {
    /// Creates a scheduler that runs episodes with `runner`.
    #[must_use]
    pub fn new(repo: Arc<dyn EventRepository>, clock: Arc<dyn Clock>, runner: Arc<EpisodeRunner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                clock,
                runner,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Arms periodic triggers for `session_id`, replacing any previous
    /// timer.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::UnknownSession` or
    /// `SchedulerError::SessionArchived` if the session cannot run, or a
    /// validation error for a zero interval.
    #[instrument(skip(self))]
    pub async fn schedule(&self, session_id: Uuid, cadence: Cadence) -> Result<(), SchedulerError> {
        if !cadence.is_valid() {
            return Err(DomainError::Validation(
                "cadence interval must be positive".into(),
            )
            .into());
        }
        runnable(load(session_id, self.inner.repo.as_ref()).await?)?;

        let task = tokio::spawn(
            run_timer(Arc::downgrade(&self.inner), session_id, cadence)
                .instrument(info_span!("session_timer", %session_id)),
        );
        let previous = self
            .inner
            .slots
            .lock()
            .await
            .entry(session_id)
            .or_default()
            .timer
            .replace(SessionTimer { cadence, task });
        if previous.is_some() {
            info!("previous timer replaced");
        }
        info!(?cadence, "session scheduled");
        Ok(())
    }

    /// Starts the session's next episode unless one is still live.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::UnknownSession` or
    /// `SchedulerError::SessionArchived` if the session cannot run, or a
    /// persistence error.
    #[instrument(skip(self))]
    pub async fn trigger(&self, session_id: Uuid) -> Result<TriggerOutcome, SchedulerError> {
        let episode_id = Uuid::new_v4();
        let cancel = CancellationSource::new();
        let token = cancel.token();
        {
            let mut slots = self.inner.slots.lock().await;
            let slot = slots.entry(session_id).or_default();
            if let Some(live) = &slot.live {
                warn!(active = %live.episode_id, "episode still live, trigger dropped");
                return Ok(TriggerOutcome::Dropped {
                    active: live.episode_id,
                });
            }
            slot.live = Some(LiveEpisode { episode_id, cancel });
        }

        let session = match self.inner.begin(session_id, episode_id).await {
            Ok(session) => session,
            Err(e) => {
                self.inner.vacate(session_id, episode_id).await;
                return Err(e);
            }
        };

        let context = EpisodeContext {
            episode_id,
            session_id,
            sequence: session.last_sequence,
            setting: session.setting.clone(),
            npcs: session
                .characters
                .iter()
                .map(|c| NpcDescriptor {
                    character_id: c.id,
                    name: c.name.clone(),
                    personality: c.personality.clone(),
                })
                .collect(),
        };
        info!(%episode_id, sequence = context.sequence, "episode started");
        let inner = self.inner.clone();
        tokio::spawn(
            inner
                .run_episode(context, token)
                .instrument(info_span!("episode_task", %session_id, %episode_id)),
        );
        Ok(TriggerOutcome::Started { episode_id })
    }

    /// Stops future triggers, signals the live episode to abort and archives
    /// the session. Returns the episode that was signalled, if any.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::UnknownSession` for an unknown session, or a
    /// persistence error.
    #[instrument(skip(self))]
    pub async fn cancel(&self, session_id: Uuid) -> Result<Option<Uuid>, SchedulerError> {
        let session = load(session_id, self.inner.repo.as_ref()).await?;
        if !session.created {
            return Err(SchedulerError::UnknownSession(session_id));
        }

        let (timer, signalled) = {
            let mut slots = self.inner.slots.lock().await;
            match slots.get_mut(&session_id) {
                Some(slot) => {
                    let signalled = slot.live.as_ref().map(|live| {
                        live.cancel.cancel();
                        live.episode_id
                    });
                    let timer = slot.timer.take();
                    // The live episode's task vacates its own entry.
                    if slot.is_empty() {
                        slots.remove(&session_id);
                    }
                    (timer, signalled)
                }
                None => (None, None),
            }
        };
        drop(timer);

        let command = ArchiveSession {
            correlation_id: session_id,
            session_id,
        };
        let (clock, repo) = (self.inner.clock.as_ref(), self.inner.repo.as_ref());
        match handle_archive_session(&command, clock, repo).await {
            Err(e) if e.is_conflict() => {
                warn!("session stream moved underneath us, archiving again");
                handle_archive_session(&command, clock, repo).await?;
            }
            result => {
                result?;
            }
        }
        info!(episode_id = ?signalled, "session cancelled");
        Ok(signalled)
    }

    /// The live episode of `session_id`, if any.
    pub async fn active_episode(&self, session_id: Uuid) -> Option<Uuid> {
        self.inner
            .slots
            .lock()
            .await
            .get(&session_id)
            .and_then(|slot| slot.live.as_ref().map(|live| live.episode_id))
    }

    /// The cadence `session_id` is scheduled with, if any.
    pub async fn cadence(&self, session_id: Uuid) -> Option<Cadence> {
        self.inner
            .slots
            .lock()
            .await
            .get(&session_id)
            .and_then(|slot| slot.timer.as_ref().map(|timer| timer.cadence))
    }

    /// Number of sessions holding a timer or a live episode.
    pub async fn tracked_sessions(&self) -> usize {
        self.inner.slots.lock().await.len()
    }
}

impl Inner {
    /// Records the episode start on the session stream. A live episode left
    /// behind by a previous process is failed first.
    async fn begin(&self, session_id: Uuid, episode_id: Uuid) -> Result<Session, SchedulerError> {
        let mut session = runnable(load(session_id, self.repo.as_ref()).await?)?;

        if let Some(stale) = session.active_episode {
            let state = match handle_interrupt(
                stale,
                "interrupted by an orchestrator restart",
                self.clock.as_ref(),
                self.repo.as_ref(),
            )
            .await
            {
                Ok(state) => state,
                Err(e) => {
                    warn!(%stale, error = %e, "stale episode could not be loaded");
                    EpisodeState::Failed
                }
            };
            session.finish_episode(stale, state, episode_id, self.clock.as_ref())?;
            persist(&mut session, self.repo.as_ref()).await?;
        }

        session.start_episode(episode_id, episode_id, self.clock.as_ref())?;
        persist(&mut session, self.repo.as_ref()).await?;
        Ok(session)
    }

    async fn run_episode(self: Arc<Self>, context: EpisodeContext, token: CancellationToken) {
        let session_id = context.session_id;
        let episode_id = context.episode_id;
        let state = match self.runner.run(context, token).await {
            Ok(report) => report.state,
            Err(e) => {
                error!(error = %e, "episode could not be recorded");
                EpisodeState::Failed
            }
        };
        if let Err(e) = self.finish(session_id, episode_id, state).await {
            error!(error = %e, "episode end not recorded on session");
        }
        self.vacate(session_id, episode_id).await;
        info!(%state, "episode finished");
    }

    /// Records the episode end on the session stream, reloading once if
    /// another writer appended first.
    async fn finish(
        &self,
        session_id: Uuid,
        episode_id: Uuid,
        state: EpisodeState,
    ) -> Result<(), SchedulerError> {
        match self.record_finish(session_id, episode_id, state).await {
            Err(e) if e.is_conflict() => {
                warn!(%session_id, "session stream moved underneath us, reloading");
                Ok(self.record_finish(session_id, episode_id, state).await?)
            }
            result => Ok(result?),
        }
    }

    async fn record_finish(
        &self,
        session_id: Uuid,
        episode_id: Uuid,
        state: EpisodeState,
    ) -> Result<(), DomainError> {
        let mut session = load(session_id, self.repo.as_ref()).await?;
        session.finish_episode(episode_id, state, episode_id, self.clock.as_ref())?;
        persist(&mut session, self.repo.as_ref()).await?;
        Ok(())
    }

    /// Frees the live slot held by `episode_id` and drops the session's
    /// entry once nothing else is tracked for it.
    async fn vacate(&self, session_id: Uuid, episode_id: Uuid) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&session_id) {
            if slot.live.as_ref().is_some_and(|live| live.episode_id == episode_id) {
                slot.live = None;
            }
            if slot.is_empty() {
                slots.remove(&session_id);
            }
        }
    }
}

fn runnable(session: Session) -> Result<Session, SchedulerError> {
    if !session.created {
        return Err(SchedulerError::UnknownSession(session.id));
    }
    if session.is_archived() {
        return Err(SchedulerError::SessionArchived(session.id));
    }
    Ok(session)
}

async fn run_timer(inner: Weak<Inner>, session_id: Uuid, cadence: Cadence) {
    loop {
        let delay = match inner.upgrade() {
            Some(inner) => cadence.delay_from(inner.clock.now()),
            None => return,
        };
        tokio::time::sleep(delay).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        // Runs detached: aborting the timer must not cut a trigger off
        // between reserving the slot and recording the start.
        let scheduler = SessionScheduler { inner };
        let fired = tokio::spawn(async move { scheduler.trigger(session_id).await }).await;
        match fired {
            Ok(Ok(_)) => {}
            Ok(Err(e @ (SchedulerError::UnknownSession(_) | SchedulerError::SessionArchived(_)))) => {
                info!(reason = %e, "timer stopped");
                return;
            }
            Ok(Err(e)) => warn!(error = %e, "scheduled trigger failed"),
            Err(e) => error!(error = %e, "scheduled trigger panicked"),
        }
    }
}

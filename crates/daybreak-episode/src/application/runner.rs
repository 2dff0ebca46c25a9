//! The episode state machine runner.
//!
//! Drives one episode from `Idle` to a terminal state: narrative and NPC
//! jobs, the vote window, outcome resolution against the world, content
//! jobs and publication. Every transition is recorded on the episode stream
//! before the runner moves on.

use std::sync::Arc;
use std::time::Duration;

use daybreak_core::cancel::CancellationToken;
use daybreak_core::clock::Clock;
use daybreak_core::error::DomainError;
use daybreak_core::repository::EventRepository;
use daybreak_generation::{
    ContentJob, Dispatcher, JobKind, JobOutput, JobPayload, JobRequest, MediaRequest,
    NarrativeDraft, NarrativeRequest, NpcRequest, TeaserRequest,
};
use daybreak_voting::VoteAggregator;
use daybreak_world_state::application::store::WorldStateStore;
use daybreak_world_state::domain::aggregates::WorldState;
use daybreak_world_state::domain::mutation::{HistoryKind, WorldEffects, WorldMutation};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::command_handlers::record_transition;
use super::publisher::{FailureNotice, Publisher, ResultNotice, VoteOpenNotice};
use crate::domain::aggregates::Episode;
use crate::domain::events::{ContentSettled, VoteOpened};
use crate::domain::outcome::{NpcLine, Outcome, PublishedAsset};
use crate::domain::state::EpisodeState;
use crate::error::EpisodeError;

/// Published in place of a teaser that could not be generated.
pub const FALLBACK_TEASER: &str =
    "Tomorrow, a new mystery unfolds as the crew's choices come back to them...";

/// A character taking part in the session, as the NPC service sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpcDescriptor {
    /// Character identifier.
    pub character_id: Uuid,
    /// Display name.
    pub name: String,
    /// Opaque personality descriptor.
    pub personality: serde_json::Value,
}

/// Everything the runner needs to know about the episode it drives.
#[derive(Debug, Clone)]
pub struct EpisodeContext {
    /// The episode to create.
    pub episode_id: Uuid,
    /// The owning session.
    pub session_id: Uuid,
    /// Day number within the session.
    pub sequence: u64,
    /// The session's setting, fed to the generators.
    pub setting: String,
    /// Characters asked for reactions.
    pub npcs: Vec<NpcDescriptor>,
}

/// Episode timing and content configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeConfig {
    /// How long players may vote.
    pub vote_window: Duration,
    /// Bound on each generation job, retries included.
    pub job_timeout: Duration,
    /// Media generated for each outcome.
    pub media_kinds: Vec<JobKind>,
    /// Whether to generate tomorrow's teaser.
    pub teaser: bool,
    /// Whether to ask characters for reactions.
    pub npc_reactions: bool,
    /// History entries fed back into narrative prompts.
    pub history_window: usize,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            vote_window: Duration::from_secs(12 * 60 * 60),
            job_timeout: Duration::from_secs(600),
            media_kinds: JobKind::MEDIA.to_vec(),
            teaser: true,
            npc_reactions: true,
            history_window: 5,
        }
    }
}

/// The result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeReport {
    /// The episode.
    pub episode_id: Uuid,
    /// The owning session.
    pub session_id: Uuid,
    /// Day number.
    pub sequence: u64,
    /// Terminal state.
    pub state: EpisodeState,
    /// The resolved outcome, if resolution happened.
    pub outcome: Option<Outcome>,
    /// Latest world version committed by the episode.
    pub world_version: Option<i64>,
    /// Content kinds published as missing.
    pub missing: Vec<JobKind>,
    /// Characters whose reaction fell back to the silent line.
    pub silent_npcs: Vec<Uuid>,
    /// Failure or abort reason.
    pub reason: Option<String>,
}

/// Why a run stopped before `Completed`.
enum Halt {
    Failed(String),
    Aborted(String),
}

impl From<DomainError> for Halt {
    fn from(e: DomainError) -> Self {
        Self::Failed(e.to_string())
    }
}

impl From<EpisodeError> for Halt {
    fn from(e: EpisodeError) -> Self {
        Self::Failed(e.to_string())
    }
}

#[derive(Default)]
struct Progress {
    silent_npcs: Vec<Uuid>,
}

/// Drives episodes through their daily cycle.
pub struct EpisodeRunner {
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    world: Arc<dyn WorldStateStore>,
    votes: Arc<VoteAggregator>,
    dispatcher: Dispatcher,
    publisher: Arc<dyn Publisher>,
    config: EpisodeConfig,
}

impl std::fmt::Debug for EpisodeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodeRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EpisodeRunner {
    /// Creates a runner over the given collaborators.
    #[must_use]
    pub fn new(
        repo: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        world: Arc<dyn WorldStateStore>,
        votes: Arc<VoteAggregator>,
        dispatcher: Dispatcher,
        publisher: Arc<dyn Publisher>,
        config: EpisodeConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            world,
            votes,
            dispatcher,
            publisher,
            config,
        }
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &EpisodeConfig {
        &self.config
    }

    /// Runs the episode described by `context` to a terminal state.
    /// `cancel` is honoured until the vote window closes.
    ///
    /// # Errors
    ///
    /// Returns an error only when the episode itself cannot be recorded
    /// (world unreadable at start, episode stream unwritable). Generation,
    /// vote, world-commit and publication failures end the episode in
    /// `Failed` and are reported, not returned.
    #[instrument(
        skip(self, context, cancel),
        fields(
            episode_id = %context.episode_id,
            session_id = %context.session_id,
            sequence = context.sequence
        )
    )]
    pub async fn run(
        &self,
        context: EpisodeContext,
        cancel: CancellationToken,
    ) -> Result<EpisodeReport, EpisodeError> {
        let (world, world_version) = self.world.read(context.session_id).await?;

        let mut episode = Episode::new(context.episode_id);
        episode.schedule(
            context.session_id,
            context.sequence,
            world_version,
            self.clock.as_ref(),
        )?;
        record_transition(&mut episode, self.repo.as_ref()).await?;
        info!(world_version, "episode scheduled");

        let mut progress = Progress::default();
        let halted = self
            .drive(&mut episode, &context, &world, &cancel, &mut progress)
            .await;

        if matches!(halted, Err(Halt::Failed(_))) && episode.state() == EpisodeState::VoteOpen {
            self.release_window(episode.id).await;
        }
        self.votes.forget(episode.id).await;

        match halted {
            Ok(()) => info!(state = %episode.state(), "episode completed"),
            Err(Halt::Aborted(reason)) => {
                episode.abort(reason.clone(), self.clock.as_ref())?;
                record_transition(&mut episode, self.repo.as_ref()).await?;
                info!(%reason, "episode aborted");
            }
            Err(Halt::Failed(reason)) => {
                let failed_in = episode.state();
                episode.fail(reason.clone(), self.clock.as_ref())?;
                record_transition(&mut episode, self.repo.as_ref()).await?;
                warn!(%reason, state = %failed_in, "episode failed");
                let notice = FailureNotice {
                    session_id: episode.session_id,
                    episode_id: episode.id,
                    day: episode.sequence,
                    state: failed_in,
                    reason,
                };
                if let Err(e) = self.publisher.publish_failure(&notice).await {
                    warn!(error = %e, "failure notification not delivered");
                }
            }
        }

        Ok(EpisodeReport {
            episode_id: episode.id,
            session_id: episode.session_id,
            sequence: episode.sequence,
            state: episode.state(),
            outcome: episode.outcome.clone(),
            world_version: episode.world_version,
            missing: episode.missing.clone(),
            silent_npcs: progress.silent_npcs,
            reason: episode.reason.clone(),
        })
    }

    async fn drive(
        &self,
        episode: &mut Episode,
        context: &EpisodeContext,
        world: &WorldState,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), Halt> {
        if cancel.is_cancelled() {
            return Err(Halt::Aborted("cancelled before the narrative was requested".into()));
        }

        // Idle → NarrativePending
        let requests = self.narrative_requests(context, world);
        let job_ids = requests.iter().map(|r| r.job_id).collect();
        episode.request_narrative(job_ids, self.clock.as_ref())?;
        record_transition(episode, self.repo.as_ref()).await?;
        let jobs = Dispatcher::join(self.dispatcher.dispatch(requests, cancel)).await;
        if cancel.is_cancelled() {
            return Err(Halt::Aborted("cancelled while the narrative was pending".into()));
        }

        // NarrativePending → VoteOpen
        let (draft, npc_lines) = self.read_narrative(&jobs, context, progress)?;
        self.open_vote(episode, draft.clone(), npc_lines, jobs).await?;

        tokio::select! {
            () = tokio::time::sleep(self.config.vote_window) => {}
            () = cancel.cancelled() => {
                self.release_window(episode.id).await;
                return Err(Halt::Aborted("cancelled while the vote was open".into()));
            }
        }

        // VoteOpen → Resolving
        let tally = self
            .votes
            .close(episode.id)
            .await
            .map_err(|e| Halt::Failed(format!("vote window could not be closed: {e}")))?;
        episode.close_vote(tally.clone(), self.clock.as_ref())?;
        record_transition(episode, self.repo.as_ref()).await?;

        // Resolving → ContentPending
        let outcome = Outcome::from_tally(
            &tally,
            &draft.choices,
            self.votes.policy().no_consensus,
            context.sequence,
        );
        let effects = outcome_effects(&outcome);
        let mutation = WorldMutation::new(
            episode.id,
            context.sequence,
            HistoryKind::Outcome,
            outcome.summary.clone(),
        )
        .with_effects(effects);
        let outcome_version = self
            .commit_with_retry(context.session_id, episode.world_version_at_start, mutation)
            .await?;
        episode.resolve_outcome(outcome.clone(), outcome_version, self.clock.as_ref())?;
        record_transition(episode, self.repo.as_ref()).await?;
        info!(summary = %outcome.summary, world_version = outcome_version, "outcome committed");

        // ContentPending → Publishing
        let settled = self
            .generate_content(episode, context, &draft, &outcome, outcome_version)
            .await;
        let missing = settled.missing.clone();
        let assets = settled.assets.clone();
        let teaser = settled.teaser.clone();
        episode.settle_content(settled, self.clock.as_ref())?;
        record_transition(episode, self.repo.as_ref()).await?;

        // Publishing → Completed
        let notice = ResultNotice {
            session_id: context.session_id,
            episode_id: episode.id,
            day: context.sequence,
            outcome,
            tally,
            assets,
            missing,
            teaser,
        };
        self.publisher
            .publish_result(&notice)
            .await
            .map_err(|e| Halt::Failed(format!("result could not be published: {e}")))?;
        episode.complete(self.clock.as_ref())?;
        record_transition(episode, self.repo.as_ref()).await?;
        Ok(())
    }

    fn narrative_requests(&self, context: &EpisodeContext, world: &WorldState) -> Vec<JobRequest> {
        let history: Vec<String> = world
            .recent_history(self.config.history_window)
            .iter()
            .map(|entry| entry.summary.clone())
            .collect();
        let snapshot = serde_json::to_value(world).unwrap_or_default();

        let mut requests = vec![JobRequest::new(
            context.episode_id,
            JobPayload::Narrative(NarrativeRequest {
                setting: context.setting.clone(),
                history: history.clone(),
                world: snapshot.clone(),
                day: context.sequence,
            }),
            self.config.job_timeout,
        )];
        if self.config.npc_reactions {
            requests.extend(context.npcs.iter().map(|npc| {
                JobRequest::new(
                    context.episode_id,
                    JobPayload::NpcReaction(NpcRequest {
                        character_id: npc.character_id,
                        name: npc.name.clone(),
                        personality: npc.personality.clone(),
                        world: snapshot.clone(),
                        recent_events: history.clone(),
                    }),
                    self.config.job_timeout,
                )
            }));
        }
        requests
    }

    fn read_narrative(
        &self,
        jobs: &[ContentJob],
        context: &EpisodeContext,
        progress: &mut Progress,
    ) -> Result<(NarrativeDraft, Vec<NpcLine>), Halt> {
        let Some((narrative_job, npc_jobs)) = jobs.split_first() else {
            return Err(Halt::Failed("narrative job was not dispatched".into()));
        };
        let draft = match &narrative_job.result {
            Some(JobOutput::Narrative(draft)) if narrative_job.is_succeeded() => draft.clone(),
            _ => {
                return Err(Halt::Failed(format!(
                    "narrative generation failed after {} attempt(s): {}",
                    narrative_job.retry_count + 1,
                    narrative_job.error.as_deref().unwrap_or("no output")
                )));
            }
        };
        if draft.choices.is_empty() {
            return Err(Halt::Failed("narrative offered no choices".into()));
        }

        let npc_lines = context
            .npcs
            .iter()
            .zip(npc_jobs)
            .map(|(npc, job)| match &job.result {
                Some(JobOutput::Reaction { text, .. }) if job.is_succeeded() => NpcLine {
                    character_id: npc.character_id,
                    name: npc.name.clone(),
                    text: text.clone(),
                    fallback: false,
                },
                _ => {
                    warn!(character_id = %npc.character_id, "npc reaction missing, using silent line");
                    progress.silent_npcs.push(npc.character_id);
                    NpcLine::silent(npc.character_id, &npc.name)
                }
            })
            .collect();
        Ok((draft, npc_lines))
    }

    async fn open_vote(
        &self,
        episode: &mut Episode,
        draft: NarrativeDraft,
        npc_lines: Vec<NpcLine>,
        jobs: Vec<ContentJob>,
    ) -> Result<(), Halt> {
        let keys = draft.choices.iter().map(|c| c.key.clone()).collect();
        let opened_at = self.clock.now();
        let ballot_box_id = self
            .votes
            .open(episode.id, self.config.vote_window, keys)
            .await
            .map_err(|e| Halt::Failed(format!("vote window could not be opened: {e}")))?;
        let closes_at = match self.votes.ballot(episode.id).await {
            Ok(snapshot) => snapshot.closes_at,
            Err(_) => None,
        }
        .unwrap_or(opened_at);

        let opened = VoteOpened {
            narrative: draft.narrative.clone(),
            choices: draft.choices.clone(),
            npc_lines: npc_lines.clone(),
            jobs,
            ballot_box_id,
            opened_at,
            closes_at,
        };
        episode.open_vote(opened, self.clock.as_ref())?;
        if let Err(e) = record_transition(episode, self.repo.as_ref()).await {
            self.release_window(episode.id).await;
            return Err(e.into());
        }

        let notice = VoteOpenNotice {
            session_id: episode.session_id,
            episode_id: episode.id,
            day: episode.sequence,
            narrative: draft.narrative,
            choices: draft.choices,
            npc_lines,
            closes_at,
        };
        self.publisher
            .publish_vote_open(&notice)
            .await
            .map_err(|e| Halt::Failed(format!("vote could not be announced: {e}")))?;
        info!(%closes_at, "vote open");
        Ok(())
    }

    async fn generate_content(
        &self,
        episode: &Episode,
        context: &EpisodeContext,
        draft: &NarrativeDraft,
        outcome: &Outcome,
        outcome_version: i64,
    ) -> ContentSettled {
        let prompt = format!("{}\n\nOutcome: {}", draft.narrative, outcome.summary);
        let mut requests: Vec<JobRequest> = self
            .config
            .media_kinds
            .iter()
            .map(|kind| {
                JobRequest::new(
                    episode.id,
                    JobPayload::Media(MediaRequest {
                        kind: *kind,
                        prompt: prompt.clone(),
                    }),
                    self.config.job_timeout,
                )
            })
            .collect();
        if self.config.teaser {
            requests.push(JobRequest::new(
                episode.id,
                JobPayload::Teaser(TeaserRequest {
                    setting: context.setting.clone(),
                    outcome: outcome.summary.clone(),
                }),
                self.config.job_timeout,
            ));
        }

        // Cancellation is no longer honoured once resolution has begun.
        let jobs = self
            .dispatcher
            .run_batch(requests, &CancellationToken::never())
            .await;

        let mut assets = Vec::new();
        let mut missing = Vec::new();
        let mut teaser = None;
        for job in &jobs {
            match &job.result {
                Some(JobOutput::Asset { handle }) if job.is_succeeded() => {
                    assets.push(PublishedAsset {
                        kind: job.kind,
                        handle: handle.clone(),
                    });
                }
                Some(JobOutput::Teaser { text }) if job.is_succeeded() => {
                    teaser = Some(text.clone());
                }
                _ => {
                    warn!(job_id = %job.id, kind = %job.kind, status = ?job.status, "content job produced nothing");
                    missing.push(job.kind);
                }
            }
        }
        if self.config.teaser && teaser.is_none() {
            teaser = Some(FALLBACK_TEASER.to_owned());
        }

        let mutation = WorldMutation::new(
            episode.id,
            context.sequence,
            HistoryKind::Content,
            content_summary(context.sequence, &assets, &missing),
        );
        // Only the outcome commit is required; a lost content record degrades the day.
        let world_version = match self
            .commit_with_retry(context.session_id, outcome_version, mutation)
            .await
        {
            Ok(version) => Some(version),
            Err(Halt::Failed(reason) | Halt::Aborted(reason)) => {
                warn!(%reason, "content not recorded in world history");
                None
            }
        };

        ContentSettled {
            jobs,
            assets,
            missing,
            teaser,
            world_version,
        }
    }

    /// Commits `mutation` at `expected_version`. On a conflict the world is
    /// re-read and the commit retried once at the current version; a second
    /// conflict is fatal.
    async fn commit_with_retry(
        &self,
        session_id: Uuid,
        expected_version: i64,
        mutation: WorldMutation,
    ) -> Result<i64, Halt> {
        match self
            .world
            .commit(session_id, expected_version, mutation.clone())
            .await
        {
            Ok(version) => Ok(version),
            Err(e) if e.is_conflict() => {
                warn!(expected_version, kind = ?mutation.kind, "world state conflict, retrying once");
                let (_, current) = self.world.read(session_id).await?;
                self.world
                    .commit(session_id, current, mutation)
                    .await
                    .map_err(|e| {
                        if e.is_conflict() {
                            Halt::Failed(format!("world state conflict persisted after retry: {e}"))
                        } else {
                            Halt::Failed(format!("world state commit failed: {e}"))
                        }
                    })
            }
            Err(e) => Err(Halt::Failed(format!("world state commit failed: {e}"))),
        }
    }

    async fn release_window(&self, episode_id: Uuid) {
        if let Err(e) = self.votes.release(episode_id).await {
            warn!(error = %e, "vote window not released");
        }
    }
}

fn outcome_effects(outcome: &Outcome) -> WorldEffects {
    let Some(proposed) = outcome.choice.as_ref().and_then(|c| c.effects.clone()) else {
        return WorldEffects::default();
    };
    serde_json::from_value(proposed).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring malformed choice effects");
        WorldEffects::default()
    })
}

fn content_summary(day: u64, assets: &[PublishedAsset], missing: &[JobKind]) -> String {
    let produced: Vec<&str> = assets.iter().map(|a| a.kind.as_str()).collect();
    let mut summary = if produced.is_empty() {
        format!("Day {day}: no media was produced")
    } else {
        format!("Day {day}: produced {}", produced.join(", "))
    };
    if !missing.is_empty() {
        let missing: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
        summary.push_str(&format!("; missing {}", missing.join(", ")));
    }
    summary.push('.');
    summary
}

#[cfg(test)]
mod tests {
    use daybreak_generation::Choice;

    use super::*;

    #[test]
    fn test_content_summary_lists_produced_and_missing_kinds() {
        let assets = vec![
            PublishedAsset {
                kind: JobKind::Image,
                handle: "img".to_owned(),
            },
            PublishedAsset {
                kind: JobKind::Voice,
                handle: "vox".to_owned(),
            },
        ];

        let summary = content_summary(2, &assets, &[JobKind::Video]);

        assert_eq!(summary, "Day 2: produced image, voice; missing video.");
    }

    #[test]
    fn test_content_summary_without_assets() {
        assert_eq!(content_summary(1, &[], &[]), "Day 1: no media was produced.");
    }

    #[test]
    fn test_outcome_effects_decode_from_winning_choice() {
        let outcome = Outcome {
            choice: Some(Choice::new("A", "vent the hold").with_effects(serde_json::json!({
                "resource_deltas": { "oxygen": -10 }
            }))),
            no_consensus: false,
            summary: "Day 1: the crew chose to vent the hold.".to_owned(),
        };

        let effects = outcome_effects(&outcome);

        assert_eq!(effects.resource_deltas.get("oxygen"), Some(&-10));
    }

    #[test]
    fn test_malformed_effects_are_ignored() {
        let outcome = Outcome {
            choice: Some(Choice::new("A", "x").with_effects(serde_json::json!("not effects"))),
            no_consensus: false,
            summary: "Day 1.".to_owned(),
        };

        assert!(outcome_effects(&outcome).is_empty());
    }
}

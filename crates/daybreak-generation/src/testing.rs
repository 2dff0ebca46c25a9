//! Scripted generation service for tests in this and downstream crates.
//!
//! Lives here rather than in `daybreak-test-support` so it can speak this
//! crate's request and output types.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::service::GenerationService;
use crate::domain::job::JobKind;
use crate::domain::request::{Choice, JobOutput, JobPayload, JobRequest, NarrativeDraft};
use crate::error::ServiceError;

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with the canned output for the request's kind.
    Canned,
    /// Answer with this output.
    Succeed(JobOutput),
    /// Fail with this error.
    Fail(ServiceError),
    /// Never answer.
    Hang,
    /// Wait, then perform the inner step.
    After(Duration, Box<Step>),
}

impl Step {
    /// A transient failure.
    #[must_use]
    pub fn transient(detail: &str) -> Self {
        Self::Fail(ServiceError::Transient(detail.to_owned()))
    }

    /// A permanent failure.
    #[must_use]
    pub fn permanent(detail: &str) -> Self {
        Self::Fail(ServiceError::Permanent(detail.to_owned()))
    }

    /// The canned output after `delay`.
    #[must_use]
    pub fn delayed(delay: Duration) -> Self {
        Self::After(delay, Box::new(Self::Canned))
    }
}

/// The narrative the scripted service produces by default.
#[must_use]
pub fn canned_narrative() -> NarrativeDraft {
    NarrativeDraft {
        narrative: "A faint signal pulses from the derelict ahead.".to_owned(),
        choices: vec![
            Choice::new("A", "Investigate the signal"),
            Choice::new("B", "Hold position"),
        ],
    }
}

/// A `GenerationService` that replays scripted steps per job kind and
/// answers with canned outputs once a kind's script runs out.
#[derive(Debug, Default)]
pub struct ScriptedService {
    scripts: Mutex<HashMap<JobKind, VecDeque<Step>>>,
    calls: Mutex<Vec<(JobKind, Uuid)>>,
}

impl ScriptedService {
    /// A service that answers every request with canned output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `steps` for `kind`, after any steps already queued.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn script(&self, kind: JobKind, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .extend(steps);
    }

    /// Number of attempts received for `kind`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn call_count(&self, kind: JobKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Number of attempts received across all kinds.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn canned(request: &JobRequest) -> JobOutput {
        match &request.payload {
            JobPayload::Narrative(_) => JobOutput::Narrative(canned_narrative()),
            JobPayload::NpcReaction(npc) => JobOutput::Reaction {
                character_id: npc.character_id,
                text: format!("{} nods slowly.", npc.name),
            },
            JobPayload::Media(media) => JobOutput::Asset {
                handle: format!("{}-{}", media.kind, request.job_id),
            },
            JobPayload::Teaser(_) => JobOutput::Teaser {
                text: "Tomorrow, the signal answers back.".to_owned(),
            },
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(&self, request: &JobRequest) -> Result<JobOutput, ServiceError> {
        let kind = request.kind();
        self.calls.lock().unwrap().push((kind, request.job_id));
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Canned);

        let mut step = step;
        loop {
            match step {
                Step::Canned => return Ok(Self::canned(request)),
                Step::Succeed(output) => return Ok(output),
                Step::Fail(error) => return Err(error),
                Step::Hang => std::future::pending::<()>().await,
                Step::After(delay, next) => {
                    tokio::time::sleep(delay).await;
                    step = *next;
                }
            }
        }
    }
}

//! Canned text generation for running without a language model.

use async_trait::async_trait;
use daybreak_generation::{
    Choice, GenerationService, JobOutput, JobPayload, JobRequest, NarrativeDraft, ServiceError,
};

/// Produces fixed narrative, reaction and teaser text. Media kinds are not
/// supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl OfflineGenerator {
    /// The offline generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenerationService for OfflineGenerator {
    async fn generate(&self, request: &JobRequest) -> Result<JobOutput, ServiceError> {
        match &request.payload {
            JobPayload::Narrative(narrative) => Ok(JobOutput::Narrative(NarrativeDraft {
                narrative: format!(
                    "Day {}: The crew discovers an ancient artifact drifting in deep space. \
                     Strange energy readings pulse from it, and the ship's systems begin acting \
                     on their own. The crew must decide whether to investigate or keep a safe distance.",
                    narrative.day
                ),
                choices: vec![
                    Choice::new("A", "investigate the artifact"),
                    Choice::new("B", "keep a safe distance"),
                ],
            })),
            JobPayload::NpcReaction(npc) => Ok(JobOutput::Reaction {
                character_id: npc.character_id,
                text: format!(
                    "{} studies the readings. \"We should assess this carefully before we act.\"",
                    npc.name
                ),
            }),
            JobPayload::Teaser(_) => Ok(JobOutput::Teaser {
                text: "Tomorrow, a new mystery unfolds as the artifact reveals its true purpose..."
                    .to_owned(),
            }),
            JobPayload::Media(media) => Err(ServiceError::Permanent(format!(
                "offline generator cannot produce {}",
                media.kind
            ))),
        }
    }
}

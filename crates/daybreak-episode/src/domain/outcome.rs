//! Value types produced along an episode: NPC lines, the resolved outcome
//! and the published assets.

use daybreak_generation::{Choice, JobKind};
use daybreak_voting::{NoConsensusPolicy, Tally, TallyOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One character's line published with the narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcLine {
    /// The character.
    pub character_id: Uuid,
    /// Display name.
    pub name: String,
    /// The reaction text.
    pub text: String,
    /// `true` when the reaction job failed and the silent line was used.
    pub fallback: bool,
}

impl NpcLine {
    /// The line used when a character's reaction could not be generated.
    #[must_use]
    pub fn silent(character_id: Uuid, name: &str) -> Self {
        Self {
            character_id,
            name: name.to_owned(),
            text: format!("{name} remains silent, contemplating the situation."),
            fallback: true,
        }
    }
}

/// A generated media asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAsset {
    /// Media kind.
    pub kind: JobKind,
    /// Opaque handle returned by the media service.
    pub handle: String,
}

/// How the day's vote was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// The choice taken, if any.
    pub choice: Option<Choice>,
    /// `true` when the vote produced no winner.
    pub no_consensus: bool,
    /// History summary committed to the world.
    pub summary: String,
}

impl Outcome {
    /// Resolves a tally against the offered choices.
    #[must_use]
    pub fn from_tally(tally: &Tally, offered: &[Choice], policy: NoConsensusPolicy, day: u64) -> Self {
        match &tally.outcome {
            TallyOutcome::Winner { choice } => {
                let taken = offered
                    .iter()
                    .find(|c| &c.key == choice)
                    .cloned()
                    .unwrap_or_else(|| Choice::new(choice.clone(), choice.clone()));
                Self {
                    summary: format!("Day {day}: the crew chose to {}.", taken.label),
                    choice: Some(taken),
                    no_consensus: false,
                }
            }
            TallyOutcome::NoConsensus => match (policy, offered.first()) {
                (NoConsensusPolicy::FirstChoice, Some(first)) => Self {
                    summary: format!(
                        "Day {day}: no decision was reached; the crew fell back to {}.",
                        first.label
                    ),
                    choice: Some(first.clone()),
                    no_consensus: true,
                },
                _ => Self {
                    summary: format!("Day {day}: no decision was reached; the crew held course."),
                    choice: None,
                    no_consensus: true,
                },
            },
        }
    }
}

//! Ballots, tallies and the resolution rule.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One player's counted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// The voting player (chat platform identity).
    pub player_id: String,
    /// The chosen option key.
    pub choice: String,
    /// When the vote was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Arrival order within the window; breaks equal timestamps.
    pub arrival: u64,
}

/// What the state machine does when a window produces no winner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoConsensusPolicy {
    /// The crew takes no action; the day is recorded as undecided.
    #[default]
    HoldCourse,
    /// The first offered choice is taken.
    FirstChoice,
}

/// Resolution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingPolicy {
    /// Minimum number of counted votes for a winner; below it the window
    /// resolves to `NoConsensus`.
    pub min_participation: u32,
    /// Fallback branch for `NoConsensus`.
    pub no_consensus: NoConsensusPolicy,
}

impl Default for VotingPolicy {
    fn default() -> Self {
        Self {
            min_participation: 1,
            no_consensus: NoConsensusPolicy::HoldCourse,
        }
    }
}

/// How a window resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TallyOutcome {
    /// A choice won.
    Winner {
        /// The winning choice key.
        choice: String,
    },
    /// No votes, or fewer than the participation threshold.
    NoConsensus,
}

/// The resolved counts of a closed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// The episode voted on.
    pub episode_id: Uuid,
    /// Counted votes per choice. Offered choices appear even with zero votes.
    pub counts: BTreeMap<String, u32>,
    /// Number of counted votes (one per player).
    pub total_votes: u32,
    /// The resolution.
    pub outcome: TallyOutcome,
}

impl Tally {
    /// The winning choice, if any.
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        match &self.outcome {
            TallyOutcome::Winner { choice } => Some(choice),
            TallyOutcome::NoConsensus => None,
        }
    }

    /// Counted votes for `choice`.
    #[must_use]
    pub fn count(&self, choice: &str) -> u32 {
        self.counts.get(choice).copied().unwrap_or(0)
    }
}

/// Resolves counted ballots: highest count wins; on a tie the choice whose
/// earliest counted ballot was submitted first wins (arrival order breaks
/// equal timestamps).
#[must_use]
pub fn resolve<'a>(
    episode_id: Uuid,
    offered: &[String],
    ballots: impl IntoIterator<Item = &'a Ballot>,
    policy: &VotingPolicy,
) -> Tally {
    let mut counts: BTreeMap<String, u32> = offered.iter().map(|c| (c.clone(), 0)).collect();
    let mut earliest: BTreeMap<String, (DateTime<Utc>, u64)> = BTreeMap::new();
    let mut total_votes = 0u32;

    for ballot in ballots {
        total_votes += 1;
        *counts.entry(ballot.choice.clone()).or_insert(0) += 1;
        let key = (ballot.submitted_at, ballot.arrival);
        earliest
            .entry(ballot.choice.clone())
            .and_modify(|first| {
                if key < *first {
                    *first = key;
                }
            })
            .or_insert(key);
    }

    let leader = earliest
        .iter()
        .map(|(choice, first)| (choice, counts[choice], *first))
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.2.cmp(&a.2)));

    let outcome = match leader {
        Some((choice, _, _)) if total_votes >= policy.min_participation.max(1) => {
            TallyOutcome::Winner {
                choice: choice.clone(),
            }
        }
        _ => TallyOutcome::NoConsensus,
    };

    Tally {
        episode_id,
        counts,
        total_votes,
        outcome,
    }
}

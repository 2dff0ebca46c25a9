//! Daybreak — Vote Aggregation bounded context.
//!
//! Collects player choices for an episode inside a time window, keeps at
//! most one counted ballot per player (last write wins) and resolves the
//! window into a deterministic `Tally`.

pub mod application;
pub mod domain;
pub mod error;

pub use application::aggregator::VoteAggregator;
pub use domain::aggregates::{BallotSnapshot, WindowStatus};
pub use domain::tally::{Ballot, NoConsensusPolicy, Tally, TallyOutcome, VotingPolicy};
pub use error::VoteError;

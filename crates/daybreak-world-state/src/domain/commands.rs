//! Commands for the World State context.

use daybreak_core::command::Command;
use uuid::Uuid;

use super::mutation::{WorldMutation, WorldSeed};

/// Command to create a session's world at version 1.
#[derive(Debug, Clone)]
pub struct SeedWorld {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session whose world is seeded.
    pub session_id: Uuid,
    /// The starting state.
    pub seed: WorldSeed,
}

impl Command for SeedWorld {
    fn command_type(&self) -> &'static str {
        "world_state.seed"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to commit a mutation if the world is still at `expected_version`.
#[derive(Debug, Clone)]
pub struct CommitMutation {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session whose world is mutated.
    pub session_id: Uuid,
    /// The version the caller read before computing `mutation`.
    pub expected_version: i64,
    /// The change to apply.
    pub mutation: WorldMutation,
}

impl Command for CommitMutation {
    fn command_type(&self) -> &'static str {
        "world_state.commit_mutation"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

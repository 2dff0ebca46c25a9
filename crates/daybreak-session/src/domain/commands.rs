//! Commands for the Session context.

use std::collections::BTreeMap;

use daybreak_core::command::Command;
use uuid::Uuid;

/// A character supplied at session creation or added later.
#[derive(Debug, Clone)]
pub struct CharacterSpec {
    /// Character identifier.
    pub character_id: Uuid,
    /// Display name.
    pub name: String,
    /// Opaque personality descriptor.
    pub personality: serde_json::Value,
    /// Characters this one relates to.
    pub relationships: Vec<Uuid>,
}

/// Command to create a session and seed its world.
#[derive(Debug, Clone)]
pub struct CreateSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new session.
    pub session_id: Uuid,
    /// The setting fed to narrative generation.
    pub setting: String,
    /// Crew member → starting status.
    pub crew: BTreeMap<String, String>,
    /// Starting resource amounts.
    pub resources: BTreeMap<String, i64>,
    /// Starting characters.
    pub characters: Vec<CharacterSpec>,
}

impl Command for CreateSession {
    fn command_type(&self) -> &'static str {
        "session.create"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to add a character to a session.
#[derive(Debug, Clone)]
pub struct AddCharacter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session.
    pub session_id: Uuid,
    /// The character.
    pub character: CharacterSpec,
}

impl Command for AddCharacter {
    fn command_type(&self) -> &'static str {
        "session.add_character"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to end a session.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session.
    pub session_id: Uuid,
}

impl Command for ArchiveSession {
    fn command_type(&self) -> &'static str {
        "session.archive"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

//! Characters taking part in a session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A non-player character. The personality is an opaque descriptor handed
/// through to the NPC service; relationships are weak references by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Character identifier.
    pub id: Uuid,
    /// The owning session.
    pub session_id: Uuid,
    /// Display name.
    pub name: String,
    /// Opaque personality descriptor.
    #[serde(default)]
    pub personality: serde_json::Value,
    /// Other characters this one relates to.
    #[serde(default)]
    pub relationships: Vec<Uuid>,
}

//! Message: the atomic, append-only unit of conversation history.

use crate::types::{ContextId, MessageId, ParticipantId, Role, TurnFlag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted message row.
///
/// Never mutated after creation except for the soft-delete flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub context_id: ContextId,
    /// `None` marks a message from the human placeholder.
    pub participant_id: Option<ParticipantId>,
    pub role: Role,
    pub content: String,
    pub turn_flag: TurnFlag,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: MessageId,
        context_id: ContextId,
        participant_id: Option<ParticipantId>,
        role: Role,
        content: impl Into<String>,
        turn_flag: TurnFlag,
    ) -> Self {
        Self {
            id,
            context_id,
            participant_id,
            role,
            content: content.into(),
            turn_flag,
            deleted: false,
            created_at: Utc::now(),
        }
    }
}

//! Context records: nodes of the branching conversation tree.

use crate::types::{ContextId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a context.
///
/// A superseded context is an abandoned branch: kept in history, skipped by
/// leaf resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContextStatus {
    #[default]
    Active,
    Superseded,
}

impl ContextStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ContextStatus::Active)
    }
}

/// A node in the conversation tree; one linear segment of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub parent_id: Option<ContextId>,
    /// Message at which this context diverged from its parent.
    pub branch_msg_id: Option<MessageId>,
    pub status: ContextStatus,
    pub created_at: DateTime<Utc>,
}

impl Context {
    pub fn root(id: ContextId) -> Self {
        Self {
            id,
            parent_id: None,
            branch_msg_id: None,
            status: ContextStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn branch(id: ContextId, parent_id: ContextId, branch_msg_id: MessageId) -> Self {
        Self {
            id,
            parent_id: Some(parent_id),
            branch_msg_id: Some(branch_msg_id),
            status: ContextStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

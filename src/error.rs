//! Error types for the conversation context engine.

use crate::types::{ContextId, MessageId};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Context not found: {0}")]
    ContextNotFound(ContextId),

    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A write was rejected because it would corrupt history.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Corruption of the persisted conversation tree.
///
/// Never repaired in place; the caller decides whether to halt the
/// conversation or fall back to a known-good branch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Duplicate message identifier: {0}")]
    DuplicateIdentifier(MessageId),

    #[error("Context {context_id} branches at message {branch_msg_id}, which is not in its ancestry")]
    OrphanedBranchPoint {
        context_id: ContextId,
        branch_msg_id: MessageId,
    },

    #[error("Context {0} has a parent but no branch point")]
    MissingBranchPoint(ContextId),

    #[error("Context {0} has no reachable root")]
    UnreachableRoot(ContextId),
}

/// Errors surfaced by the engine's public operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Message {0} is not visible on the active path")]
    MessageNotOnPath(MessageId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),
}

impl EngineError {
    /// True when the failure is an integrity violation of persisted history.
    pub fn is_integrity(&self) -> bool {
        matches!(self, EngineError::Integrity(_))
    }
}

// Integrity failures raised by the store keep their own kind.
impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Integrity(e) => EngineError::Integrity(e),
            other => EngineError::Storage(other),
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

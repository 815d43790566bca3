//! Conversation Store
//!
//! Persistence boundary for contexts and messages. The persisted rows are the
//! authoritative state; every in-memory view is rebuilt from them.

pub mod persistence;

pub use persistence::SledConversationStore;

use crate::context::{Context, ContextStatus};
use crate::error::StorageError;
use crate::message::Message;
use crate::types::{ContextId, MessageId};
use std::ops::Range;

/// Conversation store interface
pub trait ConversationStore: Send + Sync {
    fn get_context(&self, context_id: ContextId) -> Result<Option<Context>, StorageError>;

    /// Create a context with a freshly allocated identifier.
    ///
    /// Fails with `ContextNotFound` when `parent_id` names a missing context.
    fn create_context(
        &self,
        parent_id: Option<ContextId>,
        branch_msg_id: Option<MessageId>,
    ) -> Result<Context, StorageError>;

    /// Direct children of a context, ascending by identifier.
    fn children_of(&self, context_id: ContextId) -> Result<Vec<Context>, StorageError>;

    fn set_context_status(
        &self,
        context_id: ContextId,
        status: ContextStatus,
    ) -> Result<(), StorageError>;

    /// Persist a new message row.
    ///
    /// Rejects an identifier that already exists with
    /// `IntegrityError::DuplicateIdentifier`.
    fn insert_message(&self, message: &Message) -> Result<(), StorageError>;

    /// Messages of one context with `after < id < before`, ascending.
    ///
    /// Soft-deleted rows are included; callers filter them.
    fn messages_in_range(
        &self,
        context_id: ContextId,
        after: MessageId,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, StorageError>;

    /// Lowest message identifier owned by a context, deleted rows included.
    fn first_message_id(&self, context_id: ContextId) -> Result<Option<MessageId>, StorageError>;

    /// Context owning a message, if the message exists.
    fn message_owner(&self, message_id: MessageId) -> Result<Option<ContextId>, StorageError>;

    fn set_message_deleted(&self, message_id: MessageId, deleted: bool)
        -> Result<(), StorageError>;

    /// Highest message identifier reserved or persisted so far.
    fn sequence_high_water(&self) -> Result<MessageId, StorageError>;

    /// Reserve `count` consecutive message identifiers above the high-water mark.
    ///
    /// Reservations are exclusive across every handle on the same store.
    fn reserve_ids(&self, count: u64) -> Result<Range<MessageId>, StorageError>;

    fn flush(&self) -> Result<(), StorageError>;
}

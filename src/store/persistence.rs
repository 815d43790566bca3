//! Persistence layer for the Conversation Store

use crate::context::{Context, ContextStatus};
use crate::error::{IntegrityError, StorageError};
use crate::message::Message;
use crate::store::ConversationStore;
use crate::types::{ContextId, MessageId};
use bincode;
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::io;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

const TREE_CONTEXTS: &str = "contexts";
const TREE_CHILDREN: &str = "context_children";
const TREE_MESSAGES: &str = "messages";
const TREE_OWNERS: &str = "message_owners";
const TREE_META: &str = "meta";

const KEY_MESSAGE_SEQ: &[u8] = b"seq:messages";
const KEY_CONTEXT_SEQ: &[u8] = b"seq:contexts";

/// Sled-based implementation of ConversationStore
///
/// Layout:
/// - `contexts`: context id -> Context
/// - `context_children`: (parent id, child id) -> ()
/// - `messages`: (context id, message id) -> Message
/// - `message_owners`: message id -> context id (uniqueness index)
/// - `meta`: sequence counters
///
/// All ids are encoded big-endian so key order matches numeric order.
#[derive(Clone)]
pub struct SledConversationStore {
    db: Db,
    contexts: Tree,
    children: Tree,
    messages: Tree,
    owners: Tree,
    meta: Tree,
}

impl SledConversationStore {
    /// Open (or create) a store at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_io)?;
        Self::with_db(db)
    }

    /// Build a store over an already opened sled database.
    pub fn with_db(db: Db) -> Result<Self, StorageError> {
        let contexts = db.open_tree(TREE_CONTEXTS).map_err(to_storage_io)?;
        let children = db.open_tree(TREE_CHILDREN).map_err(to_storage_io)?;
        let messages = db.open_tree(TREE_MESSAGES).map_err(to_storage_io)?;
        let owners = db.open_tree(TREE_OWNERS).map_err(to_storage_io)?;
        let meta = db.open_tree(TREE_META).map_err(to_storage_io)?;
        Ok(Self {
            db,
            contexts,
            children,
            messages,
            owners,
            meta,
        })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Reserve `count` ids from a persisted counter.
    ///
    /// The counter never drops below `floor`, so ids stay ahead of rows
    /// written by a process that bypassed the counter or crashed before
    /// persisting it.
    fn reserve(&self, key: &[u8], floor: u64, count: u64) -> Result<Range<u64>, StorageError> {
        loop {
            let current = self.meta.get(key).map_err(to_storage_io)?;
            let stored = match current.as_deref() {
                Some(raw) => decode_id(raw)?,
                None => 0,
            };
            let base = stored.max(floor);
            let next = base
                .checked_add(count)
                .filter(|next| *next < u64::MAX)
                .ok_or_else(|| {
                    StorageError::IoError(io::Error::new(
                        io::ErrorKind::Other,
                        "identifier space exhausted",
                    ))
                })?;

            let swapped = self
                .meta
                .compare_and_swap(key, current, Some(next.to_be_bytes().to_vec()))
                .map_err(to_storage_io)?;
            if swapped.is_ok() {
                return Ok(base + 1..next + 1);
            }
            debug!("Sequence counter moved during reservation, retrying");
        }
    }

    fn last_id(tree: &Tree) -> Result<u64, StorageError> {
        match tree.last().map_err(to_storage_io)? {
            Some((key, _)) => decode_id(&key[key.len() - 8..]),
            None => Ok(0),
        }
    }

    fn put_context(&self, context: &Context) -> Result<(), StorageError> {
        let value = bincode::serialize(context).map_err(to_storage_data)?;
        self.contexts
            .insert(id_key(context.id), value)
            .map_err(to_storage_io)?;
        Ok(())
    }
}

impl ConversationStore for SledConversationStore {
    fn get_context(&self, context_id: ContextId) -> Result<Option<Context>, StorageError> {
        match self.contexts.get(id_key(context_id)).map_err(to_storage_io)? {
            Some(raw) => {
                let context: Context = bincode::deserialize(&raw).map_err(to_storage_data)?;
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }

    fn create_context(
        &self,
        parent_id: Option<ContextId>,
        branch_msg_id: Option<MessageId>,
    ) -> Result<Context, StorageError> {
        if let Some(parent) = parent_id {
            if !self
                .contexts
                .contains_key(id_key(parent))
                .map_err(to_storage_io)?
            {
                return Err(StorageError::ContextNotFound(parent));
            }
        }

        let floor = Self::last_id(&self.contexts)?;
        let id = self.reserve(KEY_CONTEXT_SEQ, floor, 1)?.start;
        let context = Context {
            id,
            parent_id,
            branch_msg_id,
            status: ContextStatus::Active,
            created_at: Utc::now(),
        };

        let value = bincode::serialize(&context).map_err(to_storage_data)?;
        let context_key = id_key(id);
        let child_key = parent_id.map(|parent| pair_key(parent, id));

        let result: Result<(), TransactionError<()>> = (&self.contexts, &self.children)
            .transaction(|(contexts, children)| {
                contexts.insert(&context_key[..], value.as_slice())?;
                if let Some(child_key) = child_key {
                    children.insert(&child_key[..], &b""[..])?;
                }
                Ok(())
            });
        result.map_err(tx_to_storage)?;

        debug!(context_id = id, parent_id = ?parent_id, "Created context");
        Ok(context)
    }

    fn children_of(&self, context_id: ContextId) -> Result<Vec<Context>, StorageError> {
        let mut out = Vec::new();
        for item in self.children.scan_prefix(id_key(context_id)) {
            let (key, _) = item.map_err(to_storage_io)?;
            let child_id = decode_id(&key[8..])?;
            let child = self
                .get_context(child_id)?
                .ok_or(StorageError::ContextNotFound(child_id))?;
            out.push(child);
        }
        Ok(out)
    }

    fn set_context_status(
        &self,
        context_id: ContextId,
        status: ContextStatus,
    ) -> Result<(), StorageError> {
        let mut context = self
            .get_context(context_id)?
            .ok_or(StorageError::ContextNotFound(context_id))?;
        context.status = status;
        self.put_context(&context)
    }

    fn insert_message(&self, message: &Message) -> Result<(), StorageError> {
        if !self
            .contexts
            .contains_key(id_key(message.context_id))
            .map_err(to_storage_io)?
        {
            return Err(StorageError::ContextNotFound(message.context_id));
        }

        let value = bincode::serialize(message).map_err(to_storage_data)?;
        let message_key = pair_key(message.context_id, message.id);
        let owner_key = id_key(message.id);
        let owner_value = id_key(message.context_id);

        let result = (&self.messages, &self.owners).transaction(|(messages, owners)| {
            if owners.get(owner_key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(
                    IntegrityError::DuplicateIdentifier(message.id),
                ));
            }
            owners.insert(&owner_key[..], &owner_value[..])?;
            messages.insert(&message_key[..], value.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(StorageError::Integrity(e)),
            Err(TransactionError::Storage(e)) => Err(to_storage_io(e)),
        }
    }

    fn messages_in_range(
        &self,
        context_id: ContextId,
        after: MessageId,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, StorageError> {
        let Some(first) = after.checked_add(1) else {
            return Ok(Vec::new());
        };
        if matches!(before, Some(before) if before <= first) {
            return Ok(Vec::new());
        }

        let start = pair_key(context_id, first);
        let iter = match before {
            Some(before) => self.messages.range(start..pair_key(context_id, before)),
            None => self.messages.range(start..=pair_key(context_id, MessageId::MAX)),
        };

        let mut out = Vec::new();
        for item in iter {
            let (_, value) = item.map_err(to_storage_io)?;
            let message: Message = bincode::deserialize(&value).map_err(to_storage_data)?;
            out.push(message);
        }
        Ok(out)
    }

    fn first_message_id(&self, context_id: ContextId) -> Result<Option<MessageId>, StorageError> {
        match self.messages.scan_prefix(id_key(context_id)).next() {
            Some(item) => {
                let (key, _) = item.map_err(to_storage_io)?;
                Ok(Some(decode_id(&key[8..])?))
            }
            None => Ok(None),
        }
    }

    fn message_owner(&self, message_id: MessageId) -> Result<Option<ContextId>, StorageError> {
        match self.owners.get(id_key(message_id)).map_err(to_storage_io)? {
            Some(raw) => Ok(Some(decode_id(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_message_deleted(
        &self,
        message_id: MessageId,
        deleted: bool,
    ) -> Result<(), StorageError> {
        let context_id = self
            .message_owner(message_id)?
            .ok_or(StorageError::MessageNotFound(message_id))?;
        let key = pair_key(context_id, message_id);
        let raw = self
            .messages
            .get(key)
            .map_err(to_storage_io)?
            .ok_or(StorageError::MessageNotFound(message_id))?;

        let mut message: Message = bincode::deserialize(&raw).map_err(to_storage_data)?;
        message.deleted = deleted;
        let value = bincode::serialize(&message).map_err(to_storage_data)?;
        self.messages.insert(key, value).map_err(to_storage_io)?;
        Ok(())
    }

    fn sequence_high_water(&self) -> Result<MessageId, StorageError> {
        let stored = match self.meta.get(KEY_MESSAGE_SEQ).map_err(to_storage_io)? {
            Some(raw) => decode_id(&raw)?,
            None => 0,
        };
        Ok(stored.max(Self::last_id(&self.owners)?))
    }

    fn reserve_ids(&self, count: u64) -> Result<Range<MessageId>, StorageError> {
        let floor = Self::last_id(&self.owners)?;
        let range = self.reserve(KEY_MESSAGE_SEQ, floor, count)?;
        debug!(start = range.start, end = range.end, "Reserved message ids");
        Ok(range)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(prefix: u64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&prefix.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn decode_id(raw: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| {
        StorageError::IoError(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid id encoding ({} bytes)", raw.len()),
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: bincode::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}

fn tx_to_storage(err: TransactionError<()>) -> StorageError {
    match err {
        TransactionError::Abort(()) => StorageError::IoError(io::Error::new(
            io::ErrorKind::Other,
            "transaction aborted",
        )),
        TransactionError::Storage(e) => to_storage_io(e),
    }
}

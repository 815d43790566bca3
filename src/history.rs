//! History Loader
//!
//! Reconstructs the ordered message sequence visible on one path of the
//! context tree, and the branch index of the whole tree.

use crate::context::{ContextTree, PathSegment};
use crate::error::EngineError;
use crate::message::Message;
use crate::store::ConversationStore;
use crate::types::{ContextId, MessageId};
use std::collections::BTreeMap;
use tracing::debug;

/// Reads path-scoped message sequences from a store.
pub struct HistoryLoader<'a> {
    store: &'a dyn ConversationStore,
}

impl<'a> HistoryLoader<'a> {
    pub fn new(store: &'a dyn ConversationStore) -> Self {
        Self { store }
    }

    /// Every non-deleted message visible on the path from `leaf` to the root,
    /// ascending by id.
    pub fn load_path(&self, tree: &ContextTree, leaf: ContextId) -> Result<Vec<Message>, EngineError> {
        let path = tree.path_to_root(leaf)?;
        let messages = self.collect(&path, 0)?;
        debug!(
            root_id = tree.root_id(),
            leaf_id = leaf,
            messages = messages.len(),
            "Loaded conversation path"
        );
        Ok(messages)
    }

    /// Append to `loaded` the path messages with an id above `last_seen`.
    ///
    /// Returns how many messages were appended. Rows inserted out of id order
    /// by another writer, with an id at or below `last_seen`, are only picked
    /// up by a full load.
    pub fn refresh(
        &self,
        tree: &ContextTree,
        leaf: ContextId,
        loaded: &mut Vec<Message>,
        last_seen: MessageId,
    ) -> Result<usize, EngineError> {
        let path = tree.path_to_root(leaf)?;
        let fresh = self.collect(&path, last_seen)?;
        let added = fresh.len();
        loaded.extend(fresh);
        if added > 0 {
            debug!(leaf_id = leaf, last_seen, added, "Refreshed conversation path");
        }
        Ok(added)
    }

    fn collect(&self, path: &[PathSegment], after: MessageId) -> Result<Vec<Message>, EngineError> {
        let mut messages = Vec::new();
        for segment in path {
            let rows = self
                .store
                .messages_in_range(segment.context_id, after, segment.upper_bound)?;
            messages.extend(rows.into_iter().filter(|m| !m.deleted));
        }
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }
}

/// Branch point message id -> first message id of each child context that
/// branched there, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchIndex {
    branches: BTreeMap<MessageId, Vec<MessageId>>,
}

impl BranchIndex {
    /// Index every context in the tree, superseded ones included.
    ///
    /// A child context with no messages yet contributes nothing.
    pub fn build(tree: &ContextTree, store: &dyn ConversationStore) -> Result<Self, EngineError> {
        let mut branches: BTreeMap<MessageId, Vec<MessageId>> = BTreeMap::new();
        for context in tree.contexts() {
            let Some(branch_msg_id) = context.branch_msg_id else {
                continue;
            };
            if let Some(first) = store.first_message_id(context.id)? {
                branches.entry(branch_msg_id).or_default().push(first);
            }
        }
        for firsts in branches.values_mut() {
            firsts.sort_unstable();
        }
        Ok(Self { branches })
    }

    /// First message ids of the branches forking at `msg_id`.
    pub fn children_at(&self, msg_id: MessageId) -> &[MessageId] {
        self.branches
            .get(&msg_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_branches(&self, msg_id: MessageId) -> bool {
        self.branches.contains_key(&msg_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MessageId, &[MessageId])> {
        self.branches.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

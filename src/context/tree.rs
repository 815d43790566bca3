//! Context tree: adjacency index over one conversation and active-leaf resolution.
//!
//! The index is built once per load by an explicit breadth-first walk from the
//! root, so no store-side recursive query is needed.

use crate::context::types::Context;
use crate::error::{EngineError, IntegrityError};
use crate::store::ConversationStore;
use crate::types::{ContextId, MessageId};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// One step of the chain from a leaf up to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSegment {
    pub context_id: ContextId,
    /// Only messages below this id belong to the path; `None` at the leaf.
    pub upper_bound: Option<MessageId>,
}

/// Adjacency index: context id -> children, ascending by id.
#[derive(Debug, Clone)]
pub struct ContextTree {
    root_id: ContextId,
    contexts: HashMap<ContextId, Context>,
    children: HashMap<ContextId, Vec<ContextId>>,
}

impl ContextTree {
    /// Walk the store from `root_id` and index every reachable context.
    ///
    /// A root that is not persisted yet yields an empty tree whose leaf is the
    /// root itself.
    pub fn build(store: &dyn ConversationStore, root_id: ContextId) -> Result<Self, EngineError> {
        let mut tree = Self {
            root_id,
            contexts: HashMap::new(),
            children: HashMap::new(),
        };

        let Some(root) = store.get_context(root_id)? else {
            debug!(root_id, "Root context not persisted yet");
            return Ok(tree);
        };
        tree.contexts.insert(root_id, root);

        let mut queue = VecDeque::from([root_id]);
        while let Some(current) = queue.pop_front() {
            let mut child_ids = Vec::new();
            for child in store.children_of(current)? {
                // A child seen twice or filed under the wrong parent means the
                // parent chain loops or forks.
                if child.parent_id != Some(current) || tree.contexts.contains_key(&child.id) {
                    return Err(IntegrityError::UnreachableRoot(child.id).into());
                }
                if child.branch_msg_id.is_none() {
                    return Err(IntegrityError::MissingBranchPoint(child.id).into());
                }
                child_ids.push(child.id);
                queue.push_back(child.id);
                tree.contexts.insert(child.id, child);
            }
            child_ids.sort_unstable();
            tree.children.insert(current, child_ids);
        }

        debug!(root_id, contexts = tree.contexts.len(), "Built context tree");
        Ok(tree)
    }

    pub fn root_id(&self) -> ContextId {
        self.root_id
    }

    pub fn get(&self, context_id: ContextId) -> Option<&Context> {
        self.contexts.get(&context_id)
    }

    pub fn contains(&self, context_id: ContextId) -> bool {
        self.contexts.contains_key(&context_id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Children of a context, ascending by id.
    pub fn children(&self, context_id: ContextId) -> &[ContextId] {
        self.children
            .get(&context_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every indexed context, in no particular order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    /// True when `ancestor` is `context_id` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: ContextId, context_id: ContextId) -> bool {
        let mut current = Some(context_id);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.contexts.len() {
                return false;
            }
            current = self.contexts.get(&id).and_then(|c| c.parent_id);
        }
        false
    }

    /// Resolve the active leaf: repeatedly descend into the newest active
    /// child until a context has none.
    ///
    /// The chosen child's branch point must be a message owned by the parent
    /// or one of its ancestors; anything else is an orphaned branch.
    pub fn resolve_leaf(&self, store: &dyn ConversationStore) -> Result<ContextId, EngineError> {
        let mut current = self.root_id;
        loop {
            let next = self
                .children(current)
                .iter()
                .rev()
                .filter_map(|id| self.contexts.get(id))
                .find(|child| child.status.is_active());

            let Some(child) = next else {
                return Ok(current);
            };

            let branch_msg_id = child
                .branch_msg_id
                .ok_or(IntegrityError::MissingBranchPoint(child.id))?;
            let owned_by_ancestor = match store.message_owner(branch_msg_id)? {
                Some(owner) => self.is_ancestor_or_self(owner, current),
                None => false,
            };
            if !owned_by_ancestor {
                return Err(IntegrityError::OrphanedBranchPoint {
                    context_id: child.id,
                    branch_msg_id,
                }
                .into());
            }

            current = child.id;
        }
    }

    /// Chain of `(context, upper bound)` pairs from `leaf` up to the root.
    ///
    /// Each ancestor is bounded by the branch point of the next more specific
    /// context, which excludes messages written to it after the fork.
    pub fn path_to_root(&self, leaf: ContextId) -> Result<Vec<PathSegment>, EngineError> {
        let mut segments = Vec::new();
        let mut current = leaf;
        let mut upper_bound = None;

        loop {
            segments.push(PathSegment {
                context_id: current,
                upper_bound,
            });
            if current == self.root_id {
                return Ok(segments);
            }
            if segments.len() > self.contexts.len() {
                return Err(IntegrityError::UnreachableRoot(leaf).into());
            }

            let context = self
                .contexts
                .get(&current)
                .ok_or(IntegrityError::UnreachableRoot(leaf))?;
            upper_bound = context.branch_msg_id;
            current = context
                .parent_id
                .ok_or(IntegrityError::UnreachableRoot(leaf))?;
        }
    }
}

/// Build the tree for `root_id` and resolve its active leaf.
pub fn resolve_leaf(
    store: &dyn ConversationStore,
    root_id: ContextId,
) -> Result<ContextId, EngineError> {
    ContextTree::build(store, root_id)?.resolve_leaf(store)
}

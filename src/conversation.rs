//! Conversation facade
//!
//! One instance per conversation root. Owns the per-conversation state (loaded
//! path, turn tracker, branch index, identifier buffer) and serializes every
//! mutation and view rebuild behind a single append lock. Reads run against
//! the last loaded view and never take the append lock.

use crate::allocator::{IdAllocator, DEFAULT_BLOCK_SIZE};
use crate::context::{Context, ContextStatus, ContextTree};
use crate::error::{EngineError, StorageError};
use crate::history::{BranchIndex, HistoryLoader};
use crate::message::Message;
use crate::query::{
    assemble, Assembled, AssemblySettings, ContextRequest, FormattedMessage, ModelMessage,
    TargetFormat,
};
use crate::store::ConversationStore;
use crate::turns::TurnTracker;
use crate::types::{ContextId, MessageId, ParticipantId, Role, TurnFlag};
use crate::workflow::Workflow;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine settings a conversation needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSettings {
    pub block_size: u64,
    pub assembly: AssemblySettings,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            assembly: AssemblySettings::default(),
        }
    }
}

/// Derived, rebuildable view of the active path.
struct View {
    root_id: ContextId,
    tree: ContextTree,
    leaf_id: ContextId,
    messages: Vec<Message>,
    turns: TurnTracker,
    branches: BranchIndex,
}

pub struct Conversation {
    store: Arc<dyn ConversationStore>,
    settings: ConversationSettings,
    allocator: IdAllocator,
    // Lock order: append lock, then workflow, then view.
    workflow: RwLock<Workflow>,
    view: RwLock<View>,
    append_lock: Mutex<()>,
}

impl Conversation {
    /// Start a new conversation under a freshly created root context.
    pub fn create(
        store: Arc<dyn ConversationStore>,
        workflow: Workflow,
        settings: ConversationSettings,
    ) -> Result<Self, EngineError> {
        let root = store.create_context(None, None)?;
        info!(root_id = root.id, "Created conversation");
        Self::open(store, root.id, workflow, settings)
    }

    /// Open an existing conversation and load its active path.
    ///
    /// A root that has no stored context yet loads as an empty conversation.
    pub fn open(
        store: Arc<dyn ConversationStore>,
        root_id: ContextId,
        workflow: Workflow,
        settings: ConversationSettings,
    ) -> Result<Self, EngineError> {
        let allocator = IdAllocator::new(store.clone(), settings.block_size);
        let view = build_view(store.as_ref(), root_id, &workflow)?;
        Ok(Self {
            store,
            settings,
            allocator,
            workflow: RwLock::new(workflow),
            view: RwLock::new(view),
            append_lock: Mutex::new(()),
        })
    }

    /// Switch to `root_id` and rebuild the view; reseeds the identifier buffer.
    pub fn load(&self, root_id: ContextId) -> Result<(), EngineError> {
        let _guard = self.append_lock.lock();
        let workflow = self.workflow.read();
        let view = build_view(self.store.as_ref(), root_id, &workflow)?;
        *self.view.write() = view;
        self.allocator.reset();
        Ok(())
    }

    /// Rebuild the view of the current root from storage.
    pub fn reload(&self) -> Result<(), EngineError> {
        let _guard = self.append_lock.lock();
        self.reload_locked()
    }

    // Caller holds the append lock.
    fn reload_locked(&self) -> Result<(), EngineError> {
        let workflow = self.workflow.read();
        let root_id = self.view.read().root_id;
        let view = build_view(self.store.as_ref(), root_id, &workflow)?;
        *self.view.write() = view;
        Ok(())
    }

    /// Pick up messages appended to the active path by other writers.
    ///
    /// Returns how many messages were added. New branches and soft deletes
    /// need a full `reload`.
    pub fn refresh(&self) -> Result<usize, EngineError> {
        let _append = self.append_lock.lock();
        let mut guard = self.view.write();
        let view = &mut *guard;
        let last_seen = view.messages.last().map(|m| m.id).unwrap_or(0);
        let before = view.messages.len();
        let added = HistoryLoader::new(self.store.as_ref()).refresh(
            &view.tree,
            view.leaf_id,
            &mut view.messages,
            last_seen,
        )?;
        for message in &view.messages[before..] {
            view.turns.observe(message);
        }
        Ok(added)
    }

    /// Assemble a message window.
    pub fn get(&self, request: &ContextRequest) -> Assembled {
        let workflow = self.workflow.read();
        let view = self.view.read();
        assemble(&view.messages, &workflow, &self.settings.assembly, request)
    }

    /// Internal-format window, whatever format the request names.
    pub fn messages(&self, request: &ContextRequest) -> Vec<FormattedMessage> {
        let request = ContextRequest {
            format: TargetFormat::Internal,
            ..request.clone()
        };
        self.get(&request).into_internal().unwrap_or_default()
    }

    /// Model-ready window, whatever format the request names.
    pub fn model_messages(&self, request: &ContextRequest) -> Vec<ModelMessage> {
        let request = ContextRequest {
            format: TargetFormat::Model,
            ..request.clone()
        };
        self.get(&request).into_model().unwrap_or_default()
    }

    /// Persist a message to the active leaf with the current turn parity,
    /// then reload so turn state reflects it.
    ///
    /// `participant` is `None` for the human placeholder.
    pub fn append(
        &self,
        role: impl Into<Role>,
        content: impl Into<String>,
        participant: Option<ParticipantId>,
    ) -> Result<Message, EngineError> {
        let _guard = self.append_lock.lock();
        let (leaf_id, parity) = {
            let view = self.view.read();
            (view.leaf_id, view.turns.parity())
        };

        let id = self.allocator.next_id()?;
        let message = Message::new(id, leaf_id, participant, role.into(), content, parity);
        self.store.insert_message(&message)?;
        debug!(
            message_id = id,
            leaf_id,
            participant = ?participant,
            turn_flag = parity.as_bit(),
            "Appended message"
        );

        self.reload_locked()?;
        Ok(message)
    }

    /// Fork the conversation at a visible message.
    ///
    /// The new context branches from the context owning `message_id`, so it
    /// replaces that message and everything after it. Being the newest
    /// context, it becomes the active leaf.
    pub fn branch_at(&self, message_id: MessageId) -> Result<Context, EngineError> {
        let _guard = self.append_lock.lock();
        let visible = self.view.read().messages.iter().any(|m| m.id == message_id);
        if !visible {
            return Err(EngineError::MessageNotOnPath(message_id));
        }

        let owner = self
            .store
            .message_owner(message_id)?
            .ok_or(StorageError::MessageNotFound(message_id))?;
        let context = self.store.create_context(Some(owner), Some(message_id))?;
        info!(
            context_id = context.id,
            parent_id = owner,
            branch_msg_id = message_id,
            "Created branch"
        );

        self.reload_locked()?;
        Ok(context)
    }

    /// Make `context_id` part of the active path.
    ///
    /// Activates it and each of its ancestors, superseding every newer
    /// sibling along the way.
    pub fn select_branch(&self, context_id: ContextId) -> Result<(), EngineError> {
        let _guard = self.append_lock.lock();
        {
            let view = self.view.read();
            if !view.tree.contains(context_id) {
                return Err(StorageError::ContextNotFound(context_id).into());
            }

            let mut current = view.tree.get(context_id);
            while let Some(context) = current {
                let Some(parent_id) = context.parent_id else {
                    break;
                };
                self.store
                    .set_context_status(context.id, ContextStatus::Active)?;
                for sibling in view.tree.children(parent_id) {
                    if *sibling > context.id {
                        self.store
                            .set_context_status(*sibling, ContextStatus::Superseded)?;
                    }
                }
                current = view.tree.get(parent_id);
            }
        }
        info!(context_id, "Selected branch");
        self.reload_locked()
    }

    /// Abandon a branch without deleting it.
    pub fn supersede(&self, context_id: ContextId) -> Result<(), EngineError> {
        let _guard = self.append_lock.lock();
        if !self.view.read().tree.contains(context_id) {
            warn!(context_id, "Supersede of a context outside this conversation");
            return Ok(());
        }
        self.store
            .set_context_status(context_id, ContextStatus::Superseded)?;
        info!(context_id, "Superseded branch");
        self.reload_locked()
    }

    /// Soft-delete a message; the row stays in the log.
    pub fn delete_message(&self, message_id: MessageId) -> Result<(), EngineError> {
        let _guard = self.append_lock.lock();
        self.store.set_message_deleted(message_id, true)?;
        debug!(message_id, "Deleted message");
        self.reload_locked()
    }

    /// Replace the workflow and re-derive turn state from the loaded path.
    pub fn set_workflow(&self, workflow: Workflow) -> Result<(), EngineError> {
        let _guard = self.append_lock.lock();
        let mut current = self.workflow.write();
        let mut view = self.view.write();
        warn_unknown_producers(&view.messages, &workflow);
        let View { messages, turns, .. } = &mut *view;
        turns.set_participants(workflow.ids());
        turns.replay(messages);
        *current = workflow;
        Ok(())
    }

    pub fn workflow(&self) -> Workflow {
        self.workflow.read().clone()
    }

    pub fn root_id(&self) -> ContextId {
        self.view.read().root_id
    }

    pub fn leaf_id(&self) -> ContextId {
        self.view.read().leaf_id
    }

    /// Turn flag the next appended message carries.
    pub fn parity(&self) -> TurnFlag {
        self.view.read().turns.parity()
    }

    pub fn last_output(&self, participant: ParticipantId) -> Option<String> {
        self.view
            .read()
            .turns
            .last_output(participant)
            .map(str::to_string)
    }

    pub fn turn_output(&self, participant: ParticipantId) -> Option<String> {
        self.view
            .read()
            .turns
            .turn_output(participant)
            .map(str::to_string)
    }

    pub fn branches(&self) -> BranchIndex {
        self.view.read().branches.clone()
    }

    /// Copy of the loaded path, stored roles, ascending by id.
    pub fn loaded_messages(&self) -> Vec<Message> {
        self.view.read().messages.clone()
    }

    pub fn count(&self, roles: &[Role]) -> usize {
        self.view
            .read()
            .messages
            .iter()
            .filter(|m| roles.contains(&m.role))
            .count()
    }

    /// Last visible entry with one of `roles`.
    pub fn last(&self, roles: &[Role]) -> Option<FormattedMessage> {
        let request = ContextRequest::builder().roles(roles.iter().cloned()).build();
        self.messages(&request).pop()
    }

    pub fn last_role(&self) -> Option<Role> {
        self.last(&[Role::User, Role::Assistant]).map(|m| m.role)
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.last(&[Role::User, Role::Assistant]).map(|m| m.id)
    }

    /// Render recent messages as `role: \`content\`` lines, marking the
    /// newest with `>> … <<`.
    pub fn conversation_str(&self, limit: usize, roles: &[Role], prefix: &str) -> String {
        let request = ContextRequest::builder()
            .roles(roles.iter().cloned())
            .message_limit(limit)
            .build();
        let mut lines = render_lines(&self.messages(&request));
        if let Some(newest) = lines.last_mut() {
            *newest = format!(">> {} <<", newest);
        }
        format!("{}{}", prefix, lines.join("\n"))
    }

    /// Render recent thought and result messages.
    pub fn react_str(&self, limit: usize, since_id: Option<MessageId>, prefix: &str) -> String {
        let request = ContextRequest::builder()
            .roles([Role::Thought, Role::Result])
            .message_limit(limit)
            .since(since_id.unwrap_or(0))
            .build();
        let lines = render_lines(&self.messages(&request));
        format!("{}{}", prefix, lines.join("\n"))
    }
}

fn render_lines(entries: &[FormattedMessage]) -> Vec<String> {
    entries
        .iter()
        .map(|e| format!("{}: `{}`", e.role, e.content.trim()))
        .collect()
}

fn build_view(
    store: &dyn ConversationStore,
    root_id: ContextId,
    workflow: &Workflow,
) -> Result<View, EngineError> {
    let tree = ContextTree::build(store, root_id)?;
    let leaf_id = tree.resolve_leaf(store)?;
    let messages = HistoryLoader::new(store).load_path(&tree, leaf_id)?;
    let branches = BranchIndex::build(&tree, store)?;

    warn_unknown_producers(&messages, workflow);
    let mut turns = TurnTracker::new(workflow.ids());
    turns.replay(&messages);

    Ok(View {
        root_id,
        tree,
        leaf_id,
        messages,
        turns,
        branches,
    })
}

fn warn_unknown_producers(messages: &[Message], workflow: &Workflow) {
    let unknown = messages
        .iter()
        .filter(|m| m.participant_id.is_some_and(|p| !workflow.contains(p)))
        .count();
    if unknown > 0 {
        warn!(
            messages = unknown,
            "Messages from participants missing from the workflow; excluded from turn state"
        );
    }
}

//! Parley: Branchable Multi-Participant Conversation Context
//!
//! Stores conversation history as a tree of contexts, resolves the active
//! branch, tracks turn-taking across participants, and assembles scoped,
//! role-remapped message windows for model requests.

pub mod allocator;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod history;
pub mod logging;
pub mod message;
pub mod query;
pub mod store;
pub mod turns;
pub mod types;
pub mod workflow;

pub use conversation::{Conversation, ConversationSettings};
pub use error::{EngineError, IntegrityError, StorageError};
pub use message::Message;
pub use query::{Assembled, ContextRequest, TargetFormat};
pub use types::{ContextId, MessageId, ParticipantId, Role, TurnFlag};
pub use workflow::{Participant, ParticipantKind, Workflow};

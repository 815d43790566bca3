//! Core identifier and tag types shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message identifier: globally unique, allocated in ascending creation order.
pub type MessageId = u64;

/// Context (conversation tree node) identifier.
pub type ContextId = u64;

/// Participant identifier, owned by the workflow graph.
pub type ParticipantId = u64;

/// Alternating turn marker stored on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TurnFlag {
    #[default]
    Even,
    Odd,
}

impl TurnFlag {
    pub fn flipped(self) -> Self {
        match self {
            TurnFlag::Even => TurnFlag::Odd,
            TurnFlag::Odd => TurnFlag::Even,
        }
    }

    pub fn as_bit(self) -> u8 {
        match self {
            TurnFlag::Even => 0,
            TurnFlag::Odd => 1,
        }
    }

    /// Any non-zero bit reads as `Odd`.
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            TurnFlag::Even
        } else {
            TurnFlag::Odd
        }
    }
}

/// Semantic role label of a message.
///
/// `User` and `Assistant` are the conversational roles that get remapped
/// relative to a requesting participant. The rest are auxiliary roles used by
/// reasoning-capable participants and tools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Thought,
    Result,
    Code,
    Output,
    Request,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Thought => "thought",
            Role::Result => "result",
            Role::Code => "code",
            Role::Output => "output",
            Role::Request => "request",
            Role::Other(label) => label.as_str(),
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "thought" => Role::Thought,
            "result" => Role::Result,
            "code" => Role::Code,
            "output" => Role::Output,
            "request" => Role::Request,
            other => Role::Other(other.to_string()),
        }
    }

    /// True for the roles subject to user/assistant remapping.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }

    /// Auxiliary roles admitted when producing model-ready output.
    pub fn model_auxiliary() -> [Role; 3] {
        [Role::Output, Role::Code, Role::Result]
    }
}

impl From<String> for Role {
    fn from(label: String) -> Self {
        Role::from_label(&label)
    }
}

impl From<&str> for Role {
    fn from(label: &str) -> Self {
        Role::from_label(label)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

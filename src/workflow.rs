//! Workflow description handed over by the workflow-graph collaborator.
//!
//! The engine only reads participant identity, declared inputs and the few
//! configuration values used for filtering and truncation.

use crate::error::EngineError;
use crate::types::{ParticipantId, Role};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Kind of a workflow participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantKind {
    #[default]
    Agent,
    Human,
    Tool,
}

/// Whether a preload entry is injected into model context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreloadKind {
    #[default]
    Context,
    Welcome,
    #[serde(other)]
    Other,
}

/// A statically configured entry prepended to model-ready output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadEntry {
    pub role: Role,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: PreloadKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Per-participant settings, keyed the way the workflow graph stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    #[serde(rename = "group.show_members_as_user_role", default = "default_true")]
    pub show_members_as_user_role: bool,

    #[serde(rename = "chat.max_messages", default)]
    pub max_messages: Option<usize>,

    #[serde(rename = "chat.max_turns", default)]
    pub max_turns: Option<usize>,

    #[serde(
        rename = "chat.preload.data",
        default,
        deserialize_with = "deserialize_preload"
    )]
    pub preload: Vec<PreloadEntry>,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            show_members_as_user_role: true,
            max_messages: None,
            max_turns: None,
            preload: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

// Preload data arrives either as a list or as a JSON-encoded string.
fn deserialize_preload<'de, D>(deserializer: D) -> Result<Vec<PreloadEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<PreloadEntry>),
        Encoded(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::List(entries) => Ok(entries),
        Raw::Encoded(text) if text.trim().is_empty() => Ok(Vec::new()),
        Raw::Encoded(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}

/// One configured agent, human placeholder, or tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: ParticipantKind,
    /// Participants feeding this one.
    #[serde(default)]
    pub inputs: Vec<ParticipantId>,
    #[serde(default)]
    pub config: ParticipantConfig,
}

impl Participant {
    pub fn agent(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ParticipantKind::Agent,
            inputs: Vec::new(),
            config: ParticipantConfig::default(),
        }
    }

    pub fn human(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            kind: ParticipantKind::Human,
            ..Self::agent(id, name)
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = ParticipantId>) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    pub fn with_config(mut self, config: ParticipantConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_human(&self) -> bool {
        self.kind == ParticipantKind::Human
    }
}

/// Ordered set of participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl Workflow {
    /// Build a workflow, rejecting duplicate participant ids.
    pub fn new(participants: Vec<Participant>) -> Result<Self, EngineError> {
        let workflow = Self { participants };
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        let workflow: Self = serde_json::from_str(text)
            .map_err(|e| EngineError::InvalidWorkflow(e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let workflow: Self =
            toml::from_str(text).map_err(|e| EngineError::InvalidWorkflow(e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }

    fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for participant in &self.participants {
            if !seen.insert(participant.id) {
                return Err(EngineError::InvalidWorkflow(format!(
                    "duplicate participant id {}",
                    participant.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().map(|p| p.id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

//! Context Assembler
//!
//! Turns the loaded path into the message window a participant sees:
//! 1. Resolve the requester's configuration (explicit limits win)
//! 2. Derive the user-equivalent participant set
//! 3. Filter by id, role and the requester's input sub-graph
//! 4. Remap conversational roles relative to the requester
//! 5. Keep the last N turns when a turn limit is set
//! 6. For model output, prepend context preload and drop a leading reply
//! 7. Keep the last N entries when only a message limit is set
//!
//! The loaded sequence is never mutated.

use super::request::{AssemblySettings, ContextRequest, TargetFormat};
use crate::message::Message;
use crate::types::{MessageId, ParticipantId, Role, TurnFlag};
use crate::workflow::{Participant, PreloadKind, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Entry of an internal-format window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedMessage {
    pub id: MessageId,
    /// Role after remapping.
    pub role: Role,
    pub participant_id: Option<ParticipantId>,
    pub content: String,
    pub turn_flag: TurnFlag,
}

/// Entry of a model-ready window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An assembled window, in the requested format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assembled {
    Internal(Vec<FormattedMessage>),
    Model(Vec<ModelMessage>),
}

impl Assembled {
    pub fn len(&self) -> usize {
        match self {
            Assembled::Internal(entries) => entries.len(),
            Assembled::Model(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_internal(self) -> Option<Vec<FormattedMessage>> {
        match self {
            Assembled::Internal(entries) => Some(entries),
            Assembled::Model(_) => None,
        }
    }

    pub fn into_model(self) -> Option<Vec<ModelMessage>> {
        match self {
            Assembled::Model(entries) => Some(entries),
            Assembled::Internal(_) => None,
        }
    }

    /// `(role, content)` pairs regardless of format.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        match self {
            Assembled::Internal(entries) => entries
                .iter()
                .map(|e| (e.role.as_str(), e.content.as_str()))
                .collect(),
            Assembled::Model(entries) => entries
                .iter()
                .map(|e| (e.role.as_str(), e.content.as_str()))
                .collect(),
        }
    }
}

/// How the window is scoped for one requester.
struct RequesterView<'a> {
    requester: Option<&'a Participant>,
    /// Producers whose conversational messages read as "user".
    user_equivalent: HashSet<ParticipantId>,
    /// Producers visible to the requester; `None` means everyone.
    visible: Option<HashSet<ParticipantId>>,
    message_limit: Option<usize>,
    turn_limit: Option<usize>,
}

impl<'a> RequesterView<'a> {
    fn resolve(workflow: &'a Workflow, settings: &AssemblySettings, request: &ContextRequest) -> Self {
        let requester = request.requester.and_then(|id| workflow.get(id));

        // Zero limits read as unset.
        let configured = requester.map(|p| &p.config);
        let turn_limit = request
            .turn_limit
            .or_else(|| configured.and_then(|c| c.max_turns))
            .filter(|n| *n > 0);
        let message_limit = request
            .message_limit
            .or_else(|| configured.and_then(|c| c.max_messages))
            .filter(|n| *n > 0);

        // Without a known requester there are no inputs and remapping keeps
        // its default, so every workflow member reads as user.
        let Some(participant) = requester else {
            let user_equivalent = if settings.fallback_to_all_participants {
                workflow.ids().collect()
            } else {
                HashSet::new()
            };
            return Self {
                requester: None,
                user_equivalent,
                visible: None,
                message_limit,
                turn_limit,
            };
        };

        let mut user_equivalent = HashSet::new();
        if participant.config.show_members_as_user_role {
            user_equivalent.extend(participant.inputs.iter().copied());
            if user_equivalent.is_empty() && settings.fallback_to_all_participants {
                user_equivalent.extend(workflow.ids().filter(|id| *id != participant.id));
            }
        }

        let visible: Option<HashSet<ParticipantId>> = (!participant.inputs.is_empty()).then(|| {
            participant
                .inputs
                .iter()
                .copied()
                .chain(std::iter::once(participant.id))
                .collect()
        });

        Self {
            requester: Some(participant),
            user_equivalent,
            visible,
            message_limit,
            turn_limit,
        }
    }

    fn can_see(&self, message: &Message) -> bool {
        match (&self.visible, message.participant_id) {
            (None, _) => true,
            (Some(visible), Some(producer)) => visible.contains(&producer),
            (Some(_), None) => false,
        }
    }

    fn remap(&self, message: &Message, workflow: &Workflow) -> Role {
        if !message.role.is_conversational() {
            return message.role.clone();
        }
        let reads_as_user = match message.participant_id {
            _ if message.role == Role::User => true,
            None => true,
            Some(producer) => {
                self.user_equivalent.contains(&producer)
                    || workflow.get(producer).is_some_and(Participant::is_human)
            }
        };
        if reads_as_user {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

/// Assemble a window over `messages` (the loaded path, ascending by id).
pub fn assemble(
    messages: &[Message],
    workflow: &Workflow,
    settings: &AssemblySettings,
    request: &ContextRequest,
) -> Assembled {
    let view = RequesterView::resolve(workflow, settings, request);

    let mut roles: Vec<Role> = request.roles.clone();
    if request.format == TargetFormat::Model {
        for role in &settings.model_roles {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
    }

    let mut entries: Vec<FormattedMessage> = messages
        .iter()
        .filter(|m| !m.deleted && m.id >= request.since_id)
        .filter(|m| roles.contains(&m.role))
        .filter(|m| view.can_see(m))
        .map(|m| FormattedMessage {
            id: m.id,
            role: view.remap(m, workflow),
            participant_id: m.participant_id,
            content: m.content.clone(),
            turn_flag: m.turn_flag,
        })
        .collect();

    if let Some(turns) = view.turn_limit {
        let start = last_turns_start(&entries, turns);
        entries.drain(..start);
    }
    let message_limit = if view.turn_limit.is_some() {
        None
    } else {
        view.message_limit
    };

    match request.format {
        TargetFormat::Internal => {
            keep_last(&mut entries, message_limit);
            Assembled::Internal(entries)
        }
        TargetFormat::Model => {
            let preload = view
                .requester
                .map(|p| p.config.preload.as_slice())
                .unwrap_or(&[]);
            let mut model: Vec<ModelMessage> = preload
                .iter()
                .filter(|entry| entry.kind == PreloadKind::Context && roles.contains(&entry.role))
                .map(|entry| ModelMessage {
                    role: entry.role.clone(),
                    content: entry.content.clone(),
                    name: entry.name.clone(),
                })
                .chain(entries.into_iter().map(|e| ModelMessage {
                    role: e.role,
                    content: e.content,
                    name: None,
                }))
                .collect();

            drop_leading_reply(&mut model);
            if keep_last(&mut model, message_limit) {
                drop_leading_reply(&mut model);
            }
            Assembled::Model(model)
        }
    }
}

/// Index of the first entry of the last `turns` turns.
///
/// Walks backward from the newest entry, counting flag changes; the count
/// starts from the newest entry's own flag.
fn last_turns_start(entries: &[FormattedMessage], turns: usize) -> usize {
    let Some(newest) = entries.last() else {
        return 0;
    };
    let mut flag = newest.turn_flag;
    let mut changes = 0;
    for (index, entry) in entries.iter().enumerate().rev() {
        if entry.turn_flag != flag {
            flag = entry.turn_flag;
            changes += 1;
            if changes >= turns {
                return index + 1;
            }
        }
    }
    0
}

/// Truncate to the last `limit` entries; true when anything was cut.
fn keep_last<T>(entries: &mut Vec<T>, limit: Option<usize>) -> bool {
    match limit {
        Some(limit) if entries.len() > limit => {
            entries.drain(..entries.len() - limit);
            true
        }
        _ => false,
    }
}

fn drop_leading_reply(entries: &mut Vec<ModelMessage>) {
    if entries.first().is_some_and(|e| e.role != Role::User) {
        entries.remove(0);
    }
}

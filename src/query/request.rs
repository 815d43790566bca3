//! Request types for context assembly: ContextRequest, ContextRequestBuilder,
//! AssemblySettings.

use crate::types::{MessageId, ParticipantId, Role};
use serde::{Deserialize, Serialize};

/// Output shape of an assembled window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Full entries: id, role, participant, content, turn flag.
    #[default]
    Internal,
    /// Reduced entries a model provider accepts: role, content, optional name.
    Model,
}

/// Parameters of one assembly call.
///
/// Limits left unset fall back to the requester's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub roles: Vec<Role>,
    pub format: TargetFormat,
    pub requester: Option<ParticipantId>,
    pub message_limit: Option<usize>,
    pub turn_limit: Option<usize>,
    /// Lowest message id included.
    pub since_id: MessageId,
}

impl Default for ContextRequest {
    fn default() -> Self {
        Self {
            roles: vec![Role::User, Role::Assistant],
            format: TargetFormat::Internal,
            requester: None,
            message_limit: None,
            turn_limit: None,
            since_id: 0,
        }
    }
}

impl ContextRequest {
    /// Create a new builder for constructing a ContextRequest
    ///
    /// # Example
    /// ```rust
    /// use parley::query::ContextRequest;
    ///
    /// let request = ContextRequest::builder()
    ///     .requester(3)
    ///     .turn_limit(2)
    ///     .model()
    ///     .build();
    /// assert_eq!(request.turn_limit, Some(2));
    /// ```
    pub fn builder() -> ContextRequestBuilder {
        ContextRequestBuilder::default()
    }

    pub fn includes_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

/// Builder for constructing ContextRequest with a fluent API
#[derive(Debug, Default)]
pub struct ContextRequestBuilder {
    roles: Option<Vec<Role>>,
    format: TargetFormat,
    requester: Option<ParticipantId>,
    message_limit: Option<usize>,
    turn_limit: Option<usize>,
    since_id: MessageId,
}

impl ContextRequestBuilder {
    /// Replace the included role set. Defaults to user and assistant.
    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Add one role to the included set.
    pub fn include_role(mut self, role: impl Into<Role>) -> Self {
        let role = role.into();
        let roles = self
            .roles
            .get_or_insert_with(|| vec![Role::User, Role::Assistant]);
        if !roles.contains(&role) {
            roles.push(role);
        }
        self
    }

    pub fn format(mut self, format: TargetFormat) -> Self {
        self.format = format;
        self
    }

    /// Produce model-ready entries.
    pub fn model(self) -> Self {
        self.format(TargetFormat::Model)
    }

    pub fn requester(mut self, participant: ParticipantId) -> Self {
        self.requester = Some(participant);
        self
    }

    pub fn message_limit(mut self, n: usize) -> Self {
        self.message_limit = Some(n);
        self
    }

    pub fn turn_limit(mut self, n: usize) -> Self {
        self.turn_limit = Some(n);
        self
    }

    pub fn since(mut self, message_id: MessageId) -> Self {
        self.since_id = message_id;
        self
    }

    pub fn build(self) -> ContextRequest {
        ContextRequest {
            roles: self
                .roles
                .unwrap_or_else(|| vec![Role::User, Role::Assistant]),
            format: self.format,
            requester: self.requester,
            message_limit: self.message_limit,
            turn_limit: self.turn_limit,
            since_id: self.since_id,
        }
    }
}

/// Engine-wide assembly behaviour, loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblySettings {
    /// When a requester remaps roles but declares no inputs, treat every other
    /// participant as user-equivalent.
    #[serde(default = "default_fallback")]
    pub fallback_to_all_participants: bool,

    /// Roles added to the included set for model-ready output.
    #[serde(default = "default_model_roles")]
    pub model_roles: Vec<Role>,
}

fn default_fallback() -> bool {
    true
}

fn default_model_roles() -> Vec<Role> {
    Role::model_auxiliary().to_vec()
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            fallback_to_all_participants: default_fallback(),
            model_roles: default_model_roles(),
        }
    }
}

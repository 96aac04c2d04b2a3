//! The conversation message type.
//!
//! A [`Message`] is identified by a stable id, carries a role, a content
//! payload (string or a sequence of [`ContentPart`]s), a monotonic
//! timestamp, and a cached token count. Messages are immutable once
//! appended — editing replaces the message by id and invalidates the cache.

use serde::{Deserialize, Serialize};

use crate::content::ContentPart;
use crate::ids::MessageId;

/// The role a message was authored under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The system prompt.
    System,
    /// The human operator.
    User,
    /// The model.
    Assistant,
    /// A tool execution result routed back into the conversation.
    Tool,
}

/// The content payload of a message — either a plain string or a sequence
/// of typed parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text shorthand, equivalent to a single `ContentPart::Text`.
    Text(String),
    /// A sequence of typed content parts.
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Total character length across the payload, used for token estimation.
    #[must_use]
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Parts(parts) => parts.iter().map(ContentPart::char_len).sum(),
        }
    }

    /// Render the payload as a single string (parts are newline-joined text).
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// An immutable conversation message.
///
/// Messages are appended by value; "editing" a message means replacing the
/// entry with the same id and a fresh cached token count (see
/// `ccme-context::message_store`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier, unique within a session.
    pub id: MessageId,
    /// Authoring role.
    pub role: Role,
    /// Content payload.
    pub content: Content,
    /// Monotonic non-decreasing creation timestamp (milliseconds since epoch).
    pub timestamp: i64,
    /// Cached token count, populated by the token counter on append/edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
}

impl Message {
    /// Construct a message with a fresh id and the given timestamp.
    #[must_use]
    pub fn new(role: Role, content: impl Into<Content>, timestamp: i64) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp,
            cached_tokens: None,
        }
    }

    /// Shorthand for a user message.
    #[must_use]
    pub fn user(content: impl Into<Content>, timestamp: i64) -> Self {
        Self::new(Role::User, content, timestamp)
    }

    /// Shorthand for an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<Content>, timestamp: i64) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }

    /// Shorthand for a system message.
    #[must_use]
    pub fn system(content: impl Into<Content>, timestamp: i64) -> Self {
        Self::new(Role::System, content, timestamp)
    }

    /// Shorthand for a tool-role message.
    #[must_use]
    pub fn tool(content: impl Into<Content>, timestamp: i64) -> Self {
        Self::new(Role::Tool, content, timestamp)
    }

    /// Returns a copy of this message with new content and id preserved,
    /// clearing the cached token count so the caller is forced to re-count.
    #[must_use]
    pub fn with_content(&self, content: impl Into<Content>) -> Self {
        Self {
            id: self.id.clone(),
            role: self.role,
            content: content.into(),
            timestamp: self.timestamp,
            cached_tokens: None,
        }
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

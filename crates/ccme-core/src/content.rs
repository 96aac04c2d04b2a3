//! Message content part types.
//!
//! The data model represents message content as a tagged sum —
//! text, tool-call, tool-result, reasoning — so every consumer switches on
//! the tag rather than duck-typing the payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single typed content part within a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },
    /// A tool invocation requested by the assistant.
    #[serde(rename = "tool_call")]
    ToolCall {
        /// Unique id for this call, referenced by the matching `ToolResult`.
        id: String,
        /// Tool name.
        name: String,
        /// Tool arguments (JSON object).
        arguments: Map<String, Value>,
    },
    /// The result of executing a tool call.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Id of the `ToolCall` this result answers.
        tool_call_id: String,
        /// Result content.
        content: String,
        /// Whether the tool execution errored.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// A model reasoning / thinking trace.
    #[serde(rename = "reasoning")]
    Reasoning {
        /// The reasoning text.
        text: String,
        /// Opaque provider-issued signature, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl ContentPart {
    /// Character length of the part's payload, used by the token estimator.
    #[must_use]
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text { text } | Self::Reasoning { text, .. } => text.len(),
            Self::ToolCall { id, name, arguments } => {
                id.len() + name.len() + serde_json::to_string(arguments).unwrap_or_default().len()
            }
            Self::ToolResult { tool_call_id, content, .. } => tool_call_id.len() + content.len(),
        }
    }

    /// Returns the text payload, if this part carries plain text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

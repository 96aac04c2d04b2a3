//! Pure token-estimation functions (C1: Token Counter).
//!
//! Deterministic, O(n) in the size of the input, independent of any
//! specific tokenizer implementation. Uses a chars/4 approximation,
//! consistent across providers.

use ccme_core::{Content, ContentPart, Message};

use crate::constants::{
    CHARS_PER_TOKEN, DEFAULT_URL_IMAGE_TOKENS, MESSAGE_OVERHEAD_CHARS, MIN_IMAGE_TOKENS,
};

#[allow(clippy::cast_possible_truncation)]
fn chars_to_tokens(chars: usize) -> u32 {
    chars.div_ceil(CHARS_PER_TOKEN as usize) as u32
}

/// Source of image data, for token estimation.
#[derive(Debug, Clone)]
pub enum ImageSource<'a> {
    /// Base64-encoded image data.
    Base64 { data: &'a str },
    /// URL-referenced image, dimensions unknown.
    Url,
}

/// Estimate tokens for a single image.
///
/// Base64 images are sized from the encoded data length (overhead-adjusted
/// to raw bytes, then expanded to an estimated pixel count). URL images use
/// a conservative flat default since no data is available to size from.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_image_tokens(source: Option<&ImageSource<'_>>) -> u32 {
    match source {
        Some(ImageSource::Base64 { data }) => {
            let raw_bytes = data.len() as f64 * 0.75;
            let estimated_pixels = raw_bytes * 5.0;
            let tokens = (estimated_pixels / 750.0).ceil() as u32;
            tokens.max(MIN_IMAGE_TOKENS)
        }
        Some(ImageSource::Url) | None => DEFAULT_URL_IMAGE_TOKENS,
    }
}

fn content_part_chars(part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } | ContentPart::Reasoning { text, .. } => text.len(),
        ContentPart::ToolCall {
            id,
            name,
            arguments,
        } => id.len() + name.len() + serde_json::to_string(arguments).unwrap_or_default().len(),
        ContentPart::ToolResult {
            tool_call_id,
            content,
            ..
        } => tool_call_id.len() + content.len(),
    }
}

/// Estimate tokens for a single content part.
#[must_use]
pub fn estimate_content_part_tokens(part: &ContentPart) -> u32 {
    chars_to_tokens(content_part_chars(part))
}

fn role_str(role: ccme_core::Role) -> &'static str {
    use ccme_core::Role;
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Estimate tokens for a single message, including structural overhead for
/// the role marker and framing.
#[must_use]
pub fn estimate_message_tokens(message: &Message) -> u32 {
    let mut chars = role_str(message.role).len() + MESSAGE_OVERHEAD_CHARS;
    chars += match &message.content {
        Content::Text(text) => text.len(),
        Content::Parts(parts) => parts.iter().map(content_part_chars).sum(),
    };
    chars_to_tokens(chars)
}

/// Estimate total tokens across a message slice.
#[must_use]
pub fn estimate_messages_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(|m| u64::from(estimate_message_tokens(m))).sum()
}

/// Estimate tokens for a system prompt string.
#[must_use]
pub fn estimate_system_prompt_tokens(system_prompt: &str) -> u32 {
    chars_to_tokens(system_prompt.len())
}

/// Estimate tokens for a tool definition, serialized as JSON.
#[must_use]
pub fn estimate_tool_definition_tokens(tool_json: &serde_json::Value) -> u32 {
    chars_to_tokens(tool_json.to_string().len())
}

/// Estimate tokens across a set of tool definitions.
#[must_use]
pub fn estimate_tools_tokens(tools: &[serde_json::Value]) -> u32 {
    chars_to_tokens(tools.iter().map(|t| t.to_string().len()).sum())
}

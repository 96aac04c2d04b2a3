//! Token estimation (C1 in the component breakdown): pure, deterministic
//! functions converting messages, system prompts, and tool definitions into
//! estimated token counts.

#![deny(unsafe_code)]

pub mod constants;
pub mod estimator;

pub use estimator::{
    estimate_content_part_tokens, estimate_image_tokens, estimate_message_tokens,
    estimate_messages_tokens, estimate_system_prompt_tokens, estimate_tool_definition_tokens,
    estimate_tools_tokens, ImageSource,
};

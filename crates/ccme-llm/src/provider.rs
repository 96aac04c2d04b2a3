//! Provider Adapter — the engine's one external dependency on an LLM backend.
//!
//! Consumers implement [`Provider`] once per backend; the engine never
//! speaks a provider-specific wire format directly.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of [`StreamEvent`]s returned by [`Provider::chat_stream`].
pub type ChatEventStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamEvent>> + Send>>;

/// Errors surfaced by a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the request or failed to respond.
    #[error("provider call failed: {message}")]
    CallFailed { message: String },

    /// The provider was rate limited.
    #[error("provider rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The request was cancelled before completion.
    #[error("provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether retrying the same request is reasonable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// A single event emitted while streaming a chat response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text.
    Text { delta: String },
    /// A tool invocation requested by the model.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },
    /// The stream completed normally.
    Finish { reason: FinishReason },
    /// The stream ended in an error.
    Error { message: String, code: Option<String> },
}

/// Why a stream finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolUse,
    MaxTokens,
    Cancelled,
}

/// A single message in a chat request, independent of the engine's own
/// message model so `ccme-llm` has no dependency on `ccme-context`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A request to a chat provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A single, non-streamed chat response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Core LLM provider abstraction, consumed (never implemented) by the
/// engine itself.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, e.g. `"anthropic"`.
    fn name(&self) -> &str;

    /// Perform a non-streamed chat call.
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse>;

    /// Perform a streamed chat call.
    async fn chat_stream(&self, request: &ChatRequest) -> ProviderResult<ChatEventStream>;
}

//! Abstractions the context engine consumes but never implements: the
//! provider adapter for LLM calls and the summarizer used during
//! compression.

#![deny(unsafe_code)]

pub mod provider;
pub mod summarizer;

pub use provider::{
    ChatEventStream, ChatMessage, ChatRequest, ChatResponse, FinishReason, Provider,
    ProviderError, ProviderResult, StreamEvent,
};
pub use summarizer::{KeyDecision, KeywordSummarizer, SummaryResult, Summarizer, SummarizerError};

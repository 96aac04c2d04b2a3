//! Summarizer trait and the keyword-extraction fallback used when an
//! LLM-backed summary call is unavailable or fails.

use ccme_core::{Content, ContentPart, Message, Role};
use serde::{Deserialize, Serialize};

/// A single decision extracted from the conversation, with its rationale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyDecision {
    pub decision: String,
    pub reason: String,
}

/// Structured output of a summarization pass (fixed format: task, key
/// decisions, files modified, outstanding questions).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub narrative: String,
    pub current_goal: String,
    pub key_decisions: Vec<KeyDecision>,
    pub files_modified: Vec<String>,
    pub outstanding_questions: Vec<String>,
}

/// Errors a summarizer implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("summarizer timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("failed to parse summarizer response: {reason}")]
    ParseError { reason: String },
    #[error("summarizer call failed: {message}")]
    CallFailed { message: String },
}

/// Trait for producing a [`SummaryResult`] from a run of messages.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `messages` into a structured result, bounded (where
    /// applicable) by `max_tokens`.
    async fn summarize(
        &self,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<SummaryResult, SummarizerError>;
}

/// Fast, deterministic fallback summarizer used when the provider-backed
/// summarizer is unavailable or times out. Extracts a narrative and
/// file/tool references without calling out to any model.
#[derive(Debug, Default)]
pub struct KeywordSummarizer;

impl KeywordSummarizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Summarizer for KeywordSummarizer {
    async fn summarize(
        &self,
        messages: &[Message],
        _max_tokens: u32,
    ) -> Result<SummaryResult, SummarizerError> {
        let mut user_requests = Vec::new();
        let mut files_modified = Vec::new();
        let mut tool_names = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    let text = msg.content.as_text();
                    if !text.is_empty() {
                        user_requests.push(ccme_core::text::truncate_with_suffix(
                            &text, 200, "...",
                        ));
                    }
                }
                Role::Assistant => {
                    if let Content::Parts(parts) = &msg.content {
                        for part in parts {
                            if let ContentPart::ToolCall {
                                name, arguments, ..
                            } = part
                            {
                                if !tool_names.contains(name) {
                                    tool_names.push(name.clone());
                                }
                                if let Some(path) = arguments
                                    .get("file_path")
                                    .or_else(|| arguments.get("path"))
                                    .and_then(serde_json::Value::as_str)
                                {
                                    let p = path.to_owned();
                                    if !files_modified.contains(&p) {
                                        files_modified.push(p);
                                    }
                                }
                            }
                        }
                    }
                }
                Role::System | Role::Tool => {}
            }
        }

        let narrative = if user_requests.is_empty() {
            format!("({} messages summarized)", messages.len())
        } else {
            let mut parts = vec![format!("The user made {} requests.", user_requests.len())];
            parts.push(format!("Key requests: {}", user_requests.join("; ")));
            if !tool_names.is_empty() {
                parts.push(format!("Tools used: {}", tool_names.join(", ")));
            }
            if !files_modified.is_empty() {
                parts.push(format!("Files touched: {}", files_modified.join(", ")));
            }
            parts.join(" ")
        };

        Ok(SummaryResult {
            narrative,
            current_goal: user_requests.first().cloned().unwrap_or_default(),
            key_decisions: Vec::new(),
            files_modified,
            outstanding_questions: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_summarizer_basic() {
        let summarizer = KeywordSummarizer::new();
        let messages = vec![
            Message::user("Fix the login bug", 0),
            Message::assistant("I'll look at the login code.", 1),
        ];
        let result = summarizer.summarize(&messages, 2000).await.unwrap();
        assert!(!result.narrative.is_empty());
        assert!(result.narrative.contains("1 requests"));
    }

    #[tokio::test]
    async fn keyword_summarizer_extracts_files() {
        let summarizer = KeywordSummarizer::new();
        let mut args = serde_json::Map::new();
        let _ = args.insert("file_path".into(), serde_json::json!("/src/login.rs"));
        let messages = vec![
            Message::user("Fix the login", 0),
            Message::assistant(
                Content::Parts(vec![ContentPart::ToolCall {
                    id: "tc-1".into(),
                    name: "read".into(),
                    arguments: args,
                }]),
                1,
            ),
        ];
        let result = summarizer.summarize(&messages, 2000).await.unwrap();
        assert!(result
            .files_modified
            .contains(&"/src/login.rs".to_string()));
    }

    #[tokio::test]
    async fn keyword_summarizer_empty_messages() {
        let summarizer = KeywordSummarizer::new();
        let result = summarizer.summarize(&[], 2000).await.unwrap();
        assert!(result.narrative.contains("0 messages summarized"));
    }

    #[tokio::test]
    async fn keyword_summarizer_dedupes_tool_names_and_files() {
        let summarizer = KeywordSummarizer::new();
        let mut args = serde_json::Map::new();
        let _ = args.insert("path".into(), serde_json::json!("/src/a.rs"));
        let call = ContentPart::ToolCall {
            id: "tc-1".into(),
            name: "read".into(),
            arguments: args,
        };
        let messages = vec![
            Message::assistant(Content::Parts(vec![call.clone()]), 0),
            Message::assistant(Content::Parts(vec![call]), 1),
        ];
        let result = summarizer.summarize(&messages, 2000).await.unwrap();
        assert_eq!(result.files_modified.len(), 1);
    }
}

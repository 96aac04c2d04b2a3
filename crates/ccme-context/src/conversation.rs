//! The conversation context data model: the owned aggregate a
//! session's Context Manager mutates, plus checkpoints, never-compressed
//! sections, and the per-turn budget/usage views derived from it.

use serde::{Deserialize, Serialize};

use ccme_core::{CheckpointId, Message, SessionId};

/// How lossy a checkpoint's summary currently is. Levels only move
/// downward (3 → 2 → 1) as a checkpoint ages — see [`Checkpoint::age_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CheckpointLevel {
    Compact = 1,
    Moderate = 2,
    Rich = 3,
}

/// The message range a checkpoint summarizes, recorded by message id so the
/// range survives even though the underlying messages have been dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoveredRange {
    pub first_message_id: String,
    pub last_message_id: String,
    pub message_count: u32,
}

/// A compressed summary of a range of messages no longer present in the
/// live sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub level: CheckpointLevel,
    pub covered_range: CoveredRange,
    pub summary: Message,
    pub created_at: i64,
    pub last_compressed_at: i64,
    pub original_tokens: u32,
    pub current_tokens: u32,
    pub compression_count: u32,
    /// Monotonic counter assigned at creation; used to total-order
    /// `compressed` events across a session.
    pub compression_number: u64,
    pub key_decisions: Vec<String>,
    pub file_references: Vec<String>,
}

impl Checkpoint {
    /// Age this checkpoint down to `level`, recomputing its token count from
    /// the (already re-rendered) summary text. Refuses to raise the level.
    pub fn age_to(&mut self, level: CheckpointLevel, new_tokens: u32) {
        if level < self.level {
            self.level = level;
            self.current_tokens = new_tokens;
            self.compression_count += 1;
        }
    }
}

/// A single entry in a context's compression history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionHistoryEntry {
    pub at: i64,
    pub covered_range: CoveredRange,
    pub tokens_reclaimed: u32,
}

/// A block of content preserved verbatim across every compression pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeverCompressedSection {
    pub label: String,
    pub content: String,
}

/// The task the session is working toward — a special never-compressed
/// entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub description: String,
}

/// A recorded architecture decision — another special never-compressed
/// entry, harvested by the Checkpoint Manager during compression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureDecision {
    pub summary: String,
    pub recorded_at: i64,
}

/// Model-identification and sizing metadata carried alongside the message
/// sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub model_id: String,
    pub context_window_tokens: u64,
    pub compression_history: Vec<CompressionHistoryEntry>,
}

/// The full working memory of one assistant session.
///
/// Owned exclusively by the Context Manager facade; every other component
/// only ever sees it through the manager's accessors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: SessionId,
    pub system_prompt: Option<Message>,
    pub messages: Vec<Message>,
    pub checkpoints: Vec<Checkpoint>,
    pub never_compressed: Vec<NeverCompressedSection>,
    pub task: Option<TaskDefinition>,
    pub architecture_decisions: Vec<ArchitectureDecision>,
    pub metadata: ContextMetadata,
    /// Monotonically increasing; the next compression pass is stamped with
    /// this value and it is incremented.
    pub next_compression_number: u64,
}

impl ConversationContext {
    /// A freshly seeded context for `session_id` with no messages.
    #[must_use]
    pub fn new(session_id: SessionId, model_id: impl Into<String>, context_window_tokens: u64) -> Self {
        Self {
            session_id,
            system_prompt: None,
            messages: Vec::new(),
            checkpoints: Vec::new(),
            never_compressed: Vec::new(),
            task: None,
            architecture_decisions: Vec::new(),
            metadata: ContextMetadata {
                model_id: model_id.into(),
                context_window_tokens,
                compression_history: Vec::new(),
            },
            next_compression_number: 0,
        }
    }

    /// Sum of `cached_tokens` over the live message sequence, treating an
    /// uncounted message as zero (callers are expected to have counted
    /// before appending).
    #[must_use]
    pub fn current_tokens(&self) -> u64 {
        self.messages
            .iter()
            .map(|m| u64::from(m.cached_tokens.unwrap_or(0)))
            .sum()
    }

    /// Tokens held by the system prompt, never-compressed sections, and
    /// checkpoints — everything that must be rendered into every turn
    /// besides the live message window.
    #[must_use]
    pub fn reserved_tokens(&self, estimate: impl Fn(&str) -> u32) -> u64 {
        let system = self
            .system_prompt
            .as_ref()
            .map(|m| u64::from(m.cached_tokens.unwrap_or_else(|| estimate(&m.content.as_text()))))
            .unwrap_or(0);
        let never_compressed: u64 = self
            .never_compressed
            .iter()
            .map(|s| u64::from(estimate(&s.content)))
            .sum();
        let checkpoints: u64 = self.checkpoints.iter().map(|c| u64::from(c.current_tokens)).sum();
        system + never_compressed + checkpoints
    }

    /// Drop all messages, keep the system prompt. Checkpoints and
    /// never-compressed sections are untouched — callers that want a full
    /// reset should also clear those explicitly.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Allocate and advance the next compression-number slot.
    pub fn next_compression_slot(&mut self) -> u64 {
        let n = self.next_compression_number;
        self.next_compression_number += 1;
        n
    }
}

/// Per-turn token budget. All fields are derived;
/// invariants are enforced by construction in [`ContextBudget::compute`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub max_tokens: u64,
    pub reserved_tokens: u64,
    pub usable_tokens: u64,
    pub current_tokens: u64,
    pub free_tokens: u64,
}

impl ContextBudget {
    /// Compute a budget snapshot, clamping `usable_tokens` and `free_tokens`
    /// at zero so they never observe the invariants' lower bound.
    #[must_use]
    pub fn compute(max_tokens: u64, reserved_tokens: u64, current_tokens: u64) -> Self {
        let usable_tokens = max_tokens.saturating_sub(reserved_tokens);
        let free_tokens = usable_tokens.saturating_sub(current_tokens);
        Self {
            max_tokens,
            reserved_tokens,
            usable_tokens,
            current_tokens,
            free_tokens,
        }
    }

    /// `current_tokens / max_tokens`, or `0.0` for a zero-sized window.
    #[must_use]
    pub fn usage_fraction(&self) -> f64 {
        if self.max_tokens == 0 {
            0.0
        } else {
            self.current_tokens as f64 / self.max_tokens as f64
        }
    }
}

/// Usage accounting exposed by `get_usage()`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub current_tokens: u64,
    pub max_tokens: u64,
    pub percentage: f64,
    pub checkpoint_tokens: u64,
    pub reserved_tokens: u64,
}

impl ContextUsage {
    #[must_use]
    pub fn from_budget(budget: ContextBudget, checkpoint_tokens: u64) -> Self {
        Self {
            current_tokens: budget.current_tokens,
            max_tokens: budget.max_tokens,
            percentage: budget.usage_fraction() * 100.0,
            checkpoint_tokens,
            reserved_tokens: budget.reserved_tokens,
        }
    }
}

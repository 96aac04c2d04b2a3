//! Compression Coordinator: reduces older history into summary
//! checkpoints under a configurable strategy, tier policy, and cancellation
//! contract.
//!
//! A threshold gate feeds a preserve/partition/apply/emit pipeline guarded
//! so at most one pass runs per context, routing its output through real
//! [`Checkpoint`]s and branching over truncate/summarize/hybrid strategies.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ccme_core::{CheckpointId, Message};
use ccme_llm::{Summarizer, SummaryResult};
use ccme_settings::{CompressionSettings, CompressionStrategy};

use crate::checkpoint::{
    compress_old_checkpoints, default_re_render, extract_critical_info, merge_checkpoints, ModeProfile,
};
use crate::constants::THRESHOLD_EPSILON;
use crate::conversation::{Checkpoint, CheckpointLevel, ContextBudget, ConversationContext, CoveredRange};
use crate::events::{Event, EventBus};

/// A named bound on how many checkpoints a context may retain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TierPolicy {
    Minimal,
    Basic,
    Standard,
    Premium,
    Ultra,
}

impl TierPolicy {
    #[must_use]
    pub fn checkpoint_cap(self) -> usize {
        match self {
            Self::Minimal => 2,
            Self::Basic => 4,
            Self::Standard => 8,
            Self::Premium => 16,
            Self::Ultra => 32,
        }
    }
}

/// Outcome of one [`CompressionCoordinator::run_pass`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum CompressionOutcome {
    /// Usage below threshold (and not forced), or nothing left to compress
    /// once the recent window is carved out.
    Skipped,
    /// A concurrent pass was already running; this request was dropped, not
    /// queued.
    AlreadyRunning,
    /// Cancelled before it could commit; context untouched.
    Cancelled,
    /// The summarizer failed; context untouched, `compression-failed`
    /// emitted.
    Failed { reason: String },
    /// A checkpoint was appended and the message sequence shrank.
    Applied {
        checkpoint_id: CheckpointId,
        tokens_before: u64,
        tokens_after: u64,
        compression_number: u64,
    },
}

/// Runs compression passes against a [`ConversationContext`], enforcing "at
/// most one pass per context, concurrent requests dropped".
#[derive(Default)]
pub struct CompressionCoordinator {
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CompressionCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one compression pass.
    ///
    /// `force` bypasses the usage-threshold gate (Memory Guard's
    /// critical/emergency actions force a pass regardless of usage).
    /// `estimate` counts tokens for checkpoint summaries and re-renders.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_pass(
        &self,
        context: &mut ConversationContext,
        settings: &CompressionSettings,
        tier_policy: TierPolicy,
        max_tokens: u64,
        force: bool,
        summarizer: &dyn Summarizer,
        profile: &ModeProfile,
        estimate: &(dyn Fn(&str) -> u32 + Send + Sync),
        events: &EventBus,
        cancel: &CancellationToken,
        now: i64,
    ) -> CompressionOutcome {
        if self.running.swap(true, Ordering::AcqRel) {
            return CompressionOutcome::AlreadyRunning;
        }
        let _guard = RunningGuard(&self.running);

        let reserved = context.reserved_tokens(estimate);
        let current = context.current_tokens();
        let budget = ContextBudget::compute(max_tokens, reserved, current);
        if !force && budget.usage_fraction() + THRESHOLD_EPSILON < settings.threshold {
            return CompressionOutcome::Skipped;
        }

        let preserve_recent = settings.preserve_recent as usize;
        let total = context.messages.len();
        if preserve_recent >= total {
            return CompressionOutcome::Skipped;
        }
        let split_at = total - preserve_recent;
        let compressible: Vec<Message> = context.messages[..split_at].to_vec();
        if compressible.is_empty() {
            return CompressionOutcome::Skipped;
        }

        if cancel.is_cancelled() {
            return CompressionOutcome::Cancelled;
        }

        let tokens_before = context.current_tokens();

        let checkpoint = match settings.strategy {
            CompressionStrategy::Truncate => build_truncate_checkpoint(&compressible, estimate, now),
            CompressionStrategy::Summarize => {
                match summarize(&compressible, settings.summary_max_tokens, summarizer, profile, estimate, now).await {
                    Ok(cp) => cp,
                    Err(reason) => return self.fail(context, events, reason),
                }
            }
            CompressionStrategy::Hybrid => {
                match summarize(&compressible, settings.summary_max_tokens, summarizer, profile, estimate, now).await {
                    Ok(cp) => cap_to_summary_budget(cp, settings.summary_max_tokens, estimate),
                    Err(reason) => return self.fail(context, events, reason),
                }
            }
        };

        if cancel.is_cancelled() {
            return CompressionOutcome::Cancelled;
        }

        context.messages.drain(..split_at);
        let compression_number = context.next_compression_slot();
        let mut checkpoint = checkpoint;
        checkpoint.compression_number = compression_number;
        let checkpoint_id = checkpoint.id.clone();
        context.checkpoints.push(checkpoint);

        compress_old_checkpoints(
            &mut context.checkpoints,
            context.next_compression_number,
            default_re_render,
            estimate,
        );

        enforce_tier_cap(context, tier_policy, now);

        let tokens_after = context.current_tokens();

        events.emit(&Event::Compressed {
            session_id: context.session_id.clone(),
            checkpoint_id: checkpoint_id.clone(),
            tokens_before,
            tokens_after,
            compression_number,
        });
        info!(
            session_id = %context.session_id,
            tokens_before,
            tokens_after,
            compression_number,
            "compression pass applied"
        );

        CompressionOutcome::Applied {
            checkpoint_id,
            tokens_before,
            tokens_after,
            compression_number,
        }
    }

    fn fail(&self, context: &ConversationContext, events: &EventBus, reason: String) -> CompressionOutcome {
        events.emit(&Event::CompressionFailed {
            session_id: context.session_id.clone(),
            reason: reason.clone(),
        });
        warn!(session_id = %context.session_id, reason, "compression pass failed");
        CompressionOutcome::Failed { reason }
    }
}

/// Merge the two oldest checkpoints repeatedly until the tier cap is met.
/// Always merges adjacent list entries, which by construction cover
/// contiguous ranges (each pass's compressible window starts immediately
/// after the previous one's), satisfying the "contiguous pair" requirement.
fn enforce_tier_cap(context: &mut ConversationContext, tier_policy: TierPolicy, now: i64) {
    let cap = tier_policy.checkpoint_cap();
    while context.checkpoints.len() > cap && context.checkpoints.len() >= 2 {
        let old = context.checkpoints.remove(0);
        let target = context.checkpoints.remove(0);
        let merged = merge_checkpoints(&[old], &target, now);
        context.checkpoints.insert(0, merged);
    }
}

fn build_truncate_checkpoint(
    compressible: &[Message],
    estimate: &(dyn Fn(&str) -> u32 + Send + Sync),
    now: i64,
) -> Checkpoint {
    let original_tokens: u32 = compressible
        .iter()
        .map(|m| m.cached_tokens.unwrap_or_else(|| estimate(&m.content.as_text())))
        .sum();
    let first = compressible.first().expect("non-empty compressible window");
    let last = compressible.last().expect("non-empty compressible window");
    let summary_text = format!("[{} messages dropped]", compressible.len());
    let tokens = estimate(&summary_text);
    Checkpoint {
        id: CheckpointId::new(),
        level: CheckpointLevel::Compact,
        covered_range: CoveredRange {
            first_message_id: first.id.as_str().to_owned(),
            last_message_id: last.id.as_str().to_owned(),
            message_count: compressible.len() as u32,
        },
        summary: Message::system(summary_text, now),
        created_at: now,
        last_compressed_at: now,
        original_tokens,
        current_tokens: tokens,
        compression_count: 0,
        compression_number: 0,
        key_decisions: Vec::new(),
        file_references: Vec::new(),
    }
}

async fn summarize(
    compressible: &[Message],
    summary_max_tokens: u32,
    summarizer: &dyn Summarizer,
    profile: &ModeProfile,
    estimate: &(dyn Fn(&str) -> u32 + Send + Sync),
    now: i64,
) -> Result<Checkpoint, String> {
    let result: SummaryResult = summarizer
        .summarize(compressible, summary_max_tokens)
        .await
        .map_err(|e| e.to_string())?;
    let (mut decisions, files) = extract_critical_info(compressible, profile);
    decisions.extend(result.key_decisions.iter().map(|d| d.decision.clone()));
    let text = render_summary(&result);
    let tokens = estimate(&text);
    let original_tokens: u32 = compressible
        .iter()
        .map(|m| m.cached_tokens.unwrap_or_else(|| estimate(&m.content.as_text())))
        .sum();
    let first = compressible.first().expect("non-empty compressible window");
    let last = compressible.last().expect("non-empty compressible window");
    Ok(Checkpoint {
        id: CheckpointId::new(),
        level: CheckpointLevel::Rich,
        covered_range: CoveredRange {
            first_message_id: first.id.as_str().to_owned(),
            last_message_id: last.id.as_str().to_owned(),
            message_count: compressible.len() as u32,
        },
        summary: Message::system(text, now),
        created_at: now,
        last_compressed_at: now,
        original_tokens,
        current_tokens: tokens,
        compression_count: 0,
        compression_number: 0,
        key_decisions: decisions,
        file_references: files,
    })
}

fn render_summary(result: &SummaryResult) -> String {
    let mut out = result.narrative.clone();
    if !result.current_goal.is_empty() {
        out.push_str("\ngoal: ");
        out.push_str(&result.current_goal);
    }
    if !result.key_decisions.is_empty() {
        out.push_str("\ndecisions: ");
        out.push_str(
            &result
                .key_decisions
                .iter()
                .map(|d| d.decision.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        );
    }
    if !result.files_modified.is_empty() {
        out.push_str("\nfiles: ");
        out.push_str(&result.files_modified.join(", "));
    }
    if !result.outstanding_questions.is_empty() {
        out.push_str("\nopen questions: ");
        out.push_str(&result.outstanding_questions.join("; "));
    }
    out
}

/// Hybrid strategy: if the rendered summary exceeds the configured cap,
/// truncate its tail and mark the checkpoint as already-compressed once.
fn cap_to_summary_budget(
    mut checkpoint: Checkpoint,
    summary_max_tokens: u32,
    estimate: &(dyn Fn(&str) -> u32 + Send + Sync),
) -> Checkpoint {
    if checkpoint.current_tokens <= summary_max_tokens {
        return checkpoint;
    }
    let text = checkpoint.summary.content.as_text();
    let char_budget = (summary_max_tokens as usize) * 4;
    let truncated = ccme_core::text::truncate_with_suffix(&text, char_budget, "...");
    let tokens = estimate(&truncated);
    checkpoint.summary = checkpoint.summary.with_content(truncated);
    checkpoint.current_tokens = tokens;
    checkpoint.compression_count += 1;
    checkpoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccme_core::SessionId;
    use ccme_llm::SummarizerError;

    fn estimate(s: &str) -> u32 {
        (s.len() as u32).div_ceil(4)
    }

    fn ctx_with_messages(n: usize, max_tokens: u64) -> ConversationContext {
        let mut ctx = ConversationContext::new(SessionId::new(), "m", max_tokens);
        for i in 0..n {
            let mut m = Message::user(format!("message {i} with some body text"), i as i64);
            m.cached_tokens = Some(50);
            ctx.messages.push(m);
        }
        ctx
    }

    fn settings(strategy: CompressionStrategy) -> CompressionSettings {
        CompressionSettings {
            enabled: true,
            threshold: 0.70,
            strategy,
            preserve_recent: 2,
            summary_max_tokens: 2_000,
        }
    }

    struct FailingSummarizer;
    #[async_trait::async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _messages: &[Message], _max_tokens: u32) -> Result<SummaryResult, SummarizerError> {
            Err(SummarizerError::CallFailed { message: "boom".into() })
        }
    }

    #[tokio::test]
    async fn skips_below_threshold() {
        let mut ctx = ctx_with_messages(4, 10_000);
        let coordinator = CompressionCoordinator::new();
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let summarizer = ccme_llm::KeywordSummarizer::new();
        let profile = ModeProfile::default_engineering();
        let outcome = coordinator
            .run_pass(
                &mut ctx,
                &settings(CompressionStrategy::Truncate),
                TierPolicy::Standard,
                10_000,
                false,
                &summarizer,
                &profile,
                &estimate,
                &events,
                &cancel,
                0,
            )
            .await;
        assert_eq!(outcome, CompressionOutcome::Skipped);
    }

    #[tokio::test]
    async fn skips_when_preserve_recent_covers_everything() {
        let mut ctx = ctx_with_messages(2, 100);
        let coordinator = CompressionCoordinator::new();
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let summarizer = ccme_llm::KeywordSummarizer::new();
        let profile = ModeProfile::default_engineering();
        let outcome = coordinator
            .run_pass(
                &mut ctx,
                &settings(CompressionStrategy::Truncate),
                TierPolicy::Standard,
                100,
                true,
                &summarizer,
                &profile,
                &estimate,
                &events,
                &cancel,
                0,
            )
            .await;
        assert_eq!(outcome, CompressionOutcome::Skipped);
    }

    #[tokio::test]
    async fn truncate_applies_and_shrinks_context() {
        let mut ctx = ctx_with_messages(20, 1000);
        let coordinator = CompressionCoordinator::new();
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let summarizer = ccme_llm::KeywordSummarizer::new();
        let profile = ModeProfile::default_engineering();
        let outcome = coordinator
            .run_pass(
                &mut ctx,
                &settings(CompressionStrategy::Truncate),
                TierPolicy::Standard,
                1000,
                true,
                &summarizer,
                &profile,
                &estimate,
                &events,
                &cancel,
                0,
            )
            .await;
        assert!(matches!(outcome, CompressionOutcome::Applied { .. }));
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.checkpoints.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_pass_is_dropped_not_queued() {
        let coordinator = CompressionCoordinator::new();
        coordinator.running.store(true, Ordering::SeqCst);
        let mut ctx = ctx_with_messages(20, 1000);
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let summarizer = ccme_llm::KeywordSummarizer::new();
        let profile = ModeProfile::default_engineering();
        let outcome = coordinator
            .run_pass(
                &mut ctx,
                &settings(CompressionStrategy::Truncate),
                TierPolicy::Standard,
                1000,
                true,
                &summarizer,
                &profile,
                &estimate,
                &events,
                &cancel,
                0,
            )
            .await;
        assert_eq!(outcome, CompressionOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn provider_failure_leaves_context_untouched_and_emits_failed() {
        let mut ctx = ctx_with_messages(20, 1000);
        let before = ctx.messages.len();
        let coordinator = CompressionCoordinator::new();
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let summarizer = FailingSummarizer;
        let profile = ModeProfile::default_engineering();
        let outcome = coordinator
            .run_pass(
                &mut ctx,
                &settings(CompressionStrategy::Summarize),
                TierPolicy::Standard,
                1000,
                true,
                &summarizer,
                &profile,
                &estimate,
                &events,
                &cancel,
                0,
            )
            .await;
        assert!(matches!(outcome, CompressionOutcome::Failed { .. }));
        assert_eq!(ctx.messages.len(), before);
        assert!(ctx.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_commit_leaves_context_untouched() {
        let mut ctx = ctx_with_messages(20, 1000);
        let before = ctx.messages.len();
        let coordinator = CompressionCoordinator::new();
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summarizer = ccme_llm::KeywordSummarizer::new();
        let profile = ModeProfile::default_engineering();
        let outcome = coordinator
            .run_pass(
                &mut ctx,
                &settings(CompressionStrategy::Truncate),
                TierPolicy::Standard,
                1000,
                true,
                &summarizer,
                &profile,
                &estimate,
                &events,
                &cancel,
                0,
            )
            .await;
        assert_eq!(outcome, CompressionOutcome::Cancelled);
        assert_eq!(ctx.messages.len(), before);
    }

    #[tokio::test]
    async fn tier_cap_merges_two_oldest_when_exceeded_by_one() {
        let mut ctx = ctx_with_messages(5, 10_000);
        ctx.checkpoints = (0..5)
            .map(|i| build_truncate_checkpoint(&[Message::user("x", i)], &estimate, 0))
            .collect();
        enforce_tier_cap(&mut ctx, TierPolicy::Minimal, 0);
        assert_eq!(ctx.checkpoints.len(), TierPolicy::Minimal.checkpoint_cap());
    }
}

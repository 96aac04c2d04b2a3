//! Context Manager facade: the single public entry point that
//! wires the Message Store, Compression Coordinator, Snapshot Coordinator,
//! Memory Guard, Context Pool, and Tool-Support Override Cache together
//! around one session's [`ConversationContext`].
//!
//! Also hosts Hot-Swap and the pre-turn/tool-result budgeting operations
//! (`can_accept_turn`, `process_tool_result`, `get_max_tool_result_size`)
//! carried ambiently alongside the rest of the facade's surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ccme_core::{CcmeError, Message, SessionId, SnapshotId};
use ccme_llm::Summarizer;
use ccme_settings::{CcmeSettings, CompressionStrategy};

use crate::checkpoint::ModeProfile;
use crate::compression::{CompressionCoordinator, CompressionOutcome, TierPolicy};
use crate::constants::{Thresholds, TOOL_RESULT_MAX_CHARS, TOOL_RESULT_MIN_TOKENS};
use crate::context_pool::{ContextPool, ModelInfo};
use crate::conversation::{ContextBudget, ContextUsage, ConversationContext};
use crate::errors::{CcmeContextError, Result};
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::memory_guard::{GuardState, MemoryGuard, MemoryGuardActions};
use crate::message_store::{CompressionScheduler, MessageStore, SnapshotScheduler, SnapshotTriggerReset};
use crate::snapshot::SnapshotTag;
use crate::snapshot_coordinator::SnapshotCoordinator;
use crate::snapshot_store::SnapshotStore;
use crate::tool_support::ToolSupportCache;
use crate::vram::{poll_delay, VramMonitor};

fn estimate_text(s: &str) -> u32 {
    ccme_tokens::estimate_system_prompt_tokens(s)
}

fn is_context_full(err: &CcmeContextError) -> bool {
    matches!(err, CcmeContextError::Core(CcmeError::ContextFull { .. }))
}

/// Result of [`ContextManager::can_accept_turn`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreTurnValidation {
    pub can_proceed: bool,
    pub needs_compaction: bool,
    pub would_exceed_limit: bool,
    pub current_tokens: u64,
    pub estimated_after_turn: u64,
    pub context_limit: u64,
}

/// Result of [`ContextManager::process_tool_result`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub truncated: bool,
    pub original_size: Option<usize>,
}

struct CompressionSchedulerBridge {
    coordinator: Arc<CompressionCoordinator>,
    pending: Arc<AtomicBool>,
}

impl CompressionScheduler for CompressionSchedulerBridge {
    fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }
    fn schedule(&self, _session_id: SessionId) {
        self.pending.store(true, Ordering::Release);
    }
}

struct SnapshotSchedulerBridge {
    pending: Arc<AtomicBool>,
}

impl SnapshotScheduler for SnapshotSchedulerBridge {
    fn schedule(&self, _session_id: SessionId) {
        self.pending.store(true, Ordering::Release);
    }
}

struct GuardActionsBridge<S: SnapshotStore> {
    compression: Arc<CompressionCoordinator>,
    snapshot_coordinator: Arc<SnapshotCoordinator<S>>,
    context_pool: Arc<ContextPool>,
    min_pool_size: u64,
    max_pool_size: u64,
    events: Arc<EventBus>,
    context: Arc<Mutex<ConversationContext>>,
    settings: Arc<RwLock<CcmeSettings>>,
    cancel: CancellationToken,
}

impl<S: SnapshotStore + 'static> MemoryGuardActions for GuardActionsBridge<S> {
    fn request_compression(&self, session_id: SessionId, force: bool) {
        let compression = Arc::clone(&self.compression);
        let context = Arc::clone(&self.context);
        let settings = self.settings.read().unwrap_or_else(std::sync::PoisonError::into_inner).compression.clone();
        let events = Arc::clone(&self.events);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut guard = context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let summarizer = ccme_llm::KeywordSummarizer::new();
            let profile = ModeProfile::default_engineering();
            let max_tokens = guard.metadata.context_window_tokens;
            let now = guard
                .messages
                .last()
                .map(|m| m.timestamp)
                .unwrap_or(0);
            let _ = session_id;
            let _ = compression
                .run_pass(
                    &mut guard,
                    &settings,
                    TierPolicy::Standard,
                    max_tokens,
                    force,
                    &summarizer,
                    &profile,
                    &estimate_text,
                    &events,
                    &cancel,
                    now,
                )
                .await;
        });
    }

    fn shrink_to_min(&self, session_id: SessionId) {
        self.context_pool
            .resize(self.min_pool_size, self.min_pool_size, self.max_pool_size, session_id, &self.events);
    }

    fn create_emergency_snapshot(&self, session_id: SessionId) {
        let snapshot_coordinator = Arc::clone(&self.snapshot_coordinator);
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            let snapshot = context.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
            let now = snapshot.messages.last().map(|m| m.timestamp).unwrap_or(0);
            let _ = session_id;
            let _ = snapshot_coordinator
                .create_snapshot(&snapshot, now, Some(SnapshotTag::Emergency))
                .await;
        });
    }

    fn drop_non_recent_messages(&self, _session_id: SessionId) {
        let mut guard = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let keep = 4usize;
        if guard.messages.len() > keep {
            let drop_to = guard.messages.len() - keep;
            guard.messages.drain(..drop_to);
        }
    }
}

/// The facade. Generic over the [`SnapshotStore`] backend so tests can swap
/// in an in-memory double without touching disk.
pub struct ContextManager<S: SnapshotStore> {
    session_id: SessionId,
    context: Arc<Mutex<ConversationContext>>,
    settings: Arc<RwLock<CcmeSettings>>,
    events: Arc<EventBus>,
    message_store: Arc<MessageStore>,
    compression: Arc<CompressionCoordinator>,
    snapshot_coordinator: Arc<SnapshotCoordinator<S>>,
    memory_guard: Arc<MemoryGuard>,
    context_pool: Arc<ContextPool>,
    vram_monitor: Arc<dyn VramMonitor>,
    model: ModelInfo,
    summarizer: Arc<dyn Summarizer>,
    profile: ModeProfile,
    tier_policy: TierPolicy,
    tool_support: ToolSupportCache,
    pending_compression: Arc<AtomicBool>,
    pending_snapshot: Arc<AtomicBool>,
    cancel: CancellationToken,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SnapshotStore + 'static> ContextManager<S> {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        model_id: impl Into<String>,
        context_window_tokens: u64,
        settings: CcmeSettings,
        store: Arc<S>,
        vram_monitor: Arc<dyn VramMonitor>,
        model: ModelInfo,
        summarizer: Arc<dyn Summarizer>,
        tier_policy: TierPolicy,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let context = Arc::new(Mutex::new(ConversationContext::new(
            session_id.clone(),
            model_id,
            context_window_tokens,
        )));
        let compression = Arc::new(CompressionCoordinator::new());
        let memory_guard = Arc::new(MemoryGuard::new(settings.memory_guard.thresholds.clone(), Arc::clone(&events)));
        let context_pool = Arc::new(ContextPool::new(settings.context.target_size, Box::new(|_| {})));
        let tool_support = ToolSupportCache::new(settings.tool_support.clone());

        let pending_compression = Arc::new(AtomicBool::new(false));
        let pending_snapshot = Arc::new(AtomicBool::new(false));

        let message_store = Arc::new(
            MessageStore::new(Arc::clone(&events))
                .with_compression_scheduler(Arc::new(CompressionSchedulerBridge {
                    coordinator: Arc::clone(&compression),
                    pending: Arc::clone(&pending_compression),
                }) as Arc<dyn CompressionScheduler>)
                .with_snapshot_scheduler(Arc::new(SnapshotSchedulerBridge {
                    pending: Arc::clone(&pending_snapshot),
                }) as Arc<dyn SnapshotScheduler>),
        );

        let snapshot_coordinator = Arc::new(
            SnapshotCoordinator::new(Arc::clone(&store), Arc::clone(&events))
                .with_trigger_reset(Arc::clone(&message_store) as Arc<dyn SnapshotTriggerReset>),
        );

        Self {
            session_id,
            context,
            settings: Arc::new(RwLock::new(settings)),
            events,
            message_store,
            compression,
            snapshot_coordinator,
            memory_guard,
            context_pool,
            vram_monitor,
            model,
            summarizer,
            profile: ModeProfile::default_engineering(),
            tier_policy,
            tool_support,
            pending_compression,
            pending_snapshot,
            cancel: CancellationToken::new(),
            poll_task: Mutex::new(None),
        }
    }

    fn settings_snapshot(&self) -> CcmeSettings {
        self.settings.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Begin background VRAM polling that drives [`MemoryGuard`]. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.poll_task.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(poll_delay(manager.vram_monitor.as_ref(), manager.memory_guard.current_state() >= GuardState::Warning)) => {
                        manager.poll_memory_guard();
                    }
                }
            }
        }));
        info!(session_id = %self.session_id, "context manager started");
    }

    /// Stop background polling. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.poll_task.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    fn poll_memory_guard(&self) {
        let info = self.vram_monitor.get_info();
        let settings = self.settings_snapshot();
        let usage_fraction = {
            let context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let reserved = context.reserved_tokens(estimate_text);
            ContextBudget::compute(context.metadata.context_window_tokens, reserved, context.current_tokens())
                .usage_fraction()
        };
        let actions = GuardActionsBridge {
            compression: Arc::clone(&self.compression),
            snapshot_coordinator: Arc::clone(&self.snapshot_coordinator),
            context_pool: Arc::clone(&self.context_pool),
            min_pool_size: settings.context.min_size,
            max_pool_size: settings.context.max_size,
            events: Arc::clone(&self.events),
            context: Arc::clone(&self.context),
            settings: Arc::clone(&self.settings),
            cancel: self.cancel.clone(),
        };
        self.events.emit(&Event::VramChange {
            available_fraction: info.available_fraction(),
        });
        let _ = self.memory_guard.evaluate(
            &info,
            usage_fraction,
            settings.compression.threshold,
            &self.session_id,
            &actions,
        );
    }

    /// Append a message: counts its tokens, stores it, and runs any
    /// compression/snapshot pass the store's threshold dispatch armed.
    ///
    /// If the message cannot fit under the current token budget, a forced
    /// compression pass runs first and the append is retried once. If it
    /// still does not fit — including a `maxTokens` of zero, which always
    /// rejects without running compression — the append is rejected and
    /// the context is left untouched.
    ///
    /// # Errors
    /// Returns [`CcmeContextError::Core`] wrapping [`ccme_core::CcmeError::ContextFull`]
    /// when the message cannot fit even after forced compression.
    pub async fn add_message(&self, message: Message) -> Result<()> {
        let settings = self.settings_snapshot();
        let cached_tokens = ccme_tokens::estimate_message_tokens(&message);
        let now = message.timestamp;

        let first_attempt = {
            let mut context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let max_tokens = context.metadata.context_window_tokens;
            let reserved_tokens = context.reserved_tokens(estimate_text);
            self.message_store
                .append(&mut context, message.clone(), cached_tokens, reserved_tokens, &settings, max_tokens)
        };

        if let Err(err) = first_attempt {
            if !is_context_full(&err) {
                return Err(err);
            }
            let max_tokens_is_zero = {
                let context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                context.metadata.context_window_tokens == 0
            };
            // A zero-sized window can never admit a message; forcing a
            // compression pass over it would be pure overhead; no-op.
            if max_tokens_is_zero {
                return Err(err);
            }
            self.run_compression_pass(&settings, true, now).await;
            let mut context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let max_tokens = context.metadata.context_window_tokens;
            let reserved_tokens = context.reserved_tokens(estimate_text);
            self.message_store
                .append(&mut context, message, cached_tokens, reserved_tokens, &settings, max_tokens)?;
        }

        if self.pending_compression.swap(false, Ordering::AcqRel) {
            self.run_compression_pass(&settings, false, now).await;
        }
        if self.pending_snapshot.swap(false, Ordering::AcqRel) {
            let snapshot = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
            let _ = self.snapshot_coordinator.create_snapshot(&snapshot, now, None).await;
        }
        Ok(())
    }

    async fn run_compression_pass(&self, settings: &CcmeSettings, force: bool, now: i64) -> CompressionOutcome {
        let mut context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let max_tokens = context.metadata.context_window_tokens;
        self.compression
            .run_pass(
                &mut context,
                &settings.compression,
                self.tier_policy,
                max_tokens,
                force,
                self.summarizer.as_ref(),
                &self.profile,
                &estimate_text,
                &self.events,
                &self.cancel,
                now,
            )
            .await
    }

    /// Copy-on-read view of the live context.
    #[must_use]
    pub fn get_context(&self) -> ConversationContext {
        self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn get_usage(&self) -> ContextUsage {
        let context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let reserved = context.reserved_tokens(estimate_text);
        let checkpoint_tokens: u64 = context.checkpoints.iter().map(|c| u64::from(c.current_tokens)).sum();
        let budget = ContextBudget::compute(context.metadata.context_window_tokens, reserved, context.current_tokens());
        ContextUsage::from_budget(budget, checkpoint_tokens)
    }

    /// Create a snapshot of the current context.
    ///
    /// # Errors
    /// Propagates the Snapshot Coordinator's I/O failure.
    pub async fn create_snapshot(&self, now: i64) -> Result<SnapshotId> {
        let context = self.get_context();
        Ok(self.snapshot_coordinator.create_snapshot(&context, now, None).await?)
    }

    /// List this session's stored snapshots, newest first.
    ///
    /// # Errors
    /// Propagates the Snapshot Coordinator's I/O or decode failure.
    pub async fn list_snapshots(&self) -> Result<Vec<crate::snapshot::SnapshotMetadata>> {
        Ok(self.snapshot_coordinator.list_snapshots(&self.session_id).await?)
    }

    /// Restore a previously stored snapshot, atomically replacing the live
    /// context.
    ///
    /// # Errors
    /// Propagates the Snapshot Coordinator's I/O or decode failure.
    pub async fn restore_snapshot(&self, id: &SnapshotId) -> Result<()> {
        let restored = self.snapshot_coordinator.restore_snapshot(id).await?;
        *self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = restored;
        Ok(())
    }

    /// Drop all messages, keep the system prompt.
    pub fn clear(&self) {
        let mut context = self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        context.clear_messages();
        self.events.emit(&Event::Cleared {
            session_id: self.session_id.clone(),
        });
    }

    /// Subscribe to a kind of event; drop the returned handle through
    /// [`Self::off`] to unsubscribe.
    pub fn on(&self, kind: EventKind, listener: Arc<dyn Fn(&Event) + Send + Sync>) -> Subscription {
        self.events.on(kind, listener)
    }

    pub fn off(&self, subscription: &Subscription) {
        self.events.off(subscription);
    }

    /// Hot-reconfigure settings. Validates first; a structural context-size
    /// change triggers a pool resize after the swap.
    ///
    /// # Errors
    /// Returns [`CcmeContextError::Settings`] if the new settings fail
    /// validation.
    pub fn update_config(&self, new_settings: CcmeSettings) -> Result<()> {
        new_settings.validate()?;
        let resize_needed = {
            let current = self.settings.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            current.context.min_size != new_settings.context.min_size
                || current.context.max_size != new_settings.context.max_size
                || current.context.target_size != new_settings.context.target_size
        };
        let min_size = new_settings.context.min_size;
        let max_size = new_settings.context.max_size;
        let target_size = new_settings.context.target_size;
        *self.settings.write().unwrap_or_else(std::sync::PoisonError::into_inner) = new_settings;
        if resize_needed {
            self.context_pool
                .resize(target_size, min_size, max_size, self.session_id.clone(), &self.events);
        }
        Ok(())
    }

    /// Whether a new turn can be accepted given the current token budget.
    #[must_use]
    pub fn can_accept_turn(&self, estimated_response_tokens: u64) -> PreTurnValidation {
        let usage = self.get_usage();
        let estimated_after_turn = usage.current_tokens + estimated_response_tokens;
        let ratio = if usage.max_tokens > 0 {
            usage.current_tokens as f64 / usage.max_tokens as f64
        } else {
            0.0
        };
        PreTurnValidation {
            can_proceed: ratio < Thresholds::CRITICAL,
            needs_compaction: ratio >= Thresholds::ALERT,
            would_exceed_limit: estimated_after_turn > usage.max_tokens,
            current_tokens: usage.current_tokens,
            estimated_after_turn,
            context_limit: usage.max_tokens,
        }
    }

    /// Maximum tool-result size (in chars) the remaining context budget can
    /// absorb: reserves headroom for the model's own response plus a 10%
    /// safety margin, then converts to chars at the token estimator's ratio.
    #[must_use]
    pub fn get_max_tool_result_size(&self) -> usize {
        let usage = self.get_usage();
        let remaining = usage.max_tokens.saturating_sub(usage.current_tokens);
        let response_reserve: u64 = 8_000;
        let safety_margin = remaining / 10;
        let available_tokens = remaining
            .saturating_sub(response_reserve)
            .saturating_sub(safety_margin)
            .max(u64::from(TOOL_RESULT_MIN_TOKENS));
        let budget = (available_tokens as usize).saturating_mul(ccme_tokens::constants::CHARS_PER_TOKEN as usize);
        budget.min(TOOL_RESULT_MAX_CHARS)
    }

    /// Truncate a tool result to fit the current budget.
    #[must_use]
    pub fn process_tool_result(&self, tool_call_id: &str, content: &str) -> ProcessedToolResult {
        let max_size = self.get_max_tool_result_size();
        if content.len() <= max_size {
            return ProcessedToolResult {
                tool_call_id: tool_call_id.to_owned(),
                content: content.to_owned(),
                truncated: false,
                original_size: None,
            };
        }
        let keep = max_size.saturating_sub(100);
        let truncated = ccme_core::text::truncate_with_suffix(
            content,
            keep,
            &format!("...\n[Truncated: {} chars total, showing first {keep}]", content.len()),
        );
        ProcessedToolResult {
            tool_call_id: tool_call_id.to_owned(),
            content: truncated,
            truncated: true,
            original_size: Some(content.len()),
        }
    }

    /// Hot-Swap: snapshot the current context, summarize it
    /// into a single system-prompt prefix, clear the message sequence, and
    /// reseed with new model metadata. Atomic from an observer's point of
    /// view — `get_context()` sees either the pre- or post-swap context,
    /// never an intermediate, because the working copy is built off-lock
    /// and only swapped in at the end.
    ///
    /// # Errors
    /// Propagates the Snapshot Coordinator's I/O failure.
    pub async fn hot_swap(&self, new_model_id: impl Into<String>, new_context_window_tokens: u64, now: i64) -> Result<SnapshotId> {
        let new_model_id = new_model_id.into();
        let mut working = self.get_context();

        let snapshot_id = self.snapshot_coordinator.create_snapshot(&working, now, None).await?;

        let mut summarize_all = self.settings_snapshot().compression;
        summarize_all.strategy = CompressionStrategy::Summarize;
        summarize_all.preserve_recent = 0;
        summarize_all.threshold = 0.0;

        let summarizer = self.summarizer.as_ref();
        let outcome = self
            .compression
            .run_pass(
                &mut working,
                &summarize_all,
                self.tier_policy,
                u64::MAX,
                true,
                summarizer,
                &self.profile,
                &estimate_text,
                &self.events,
                &self.cancel,
                now,
            )
            .await;

        let prefix = match outcome {
            CompressionOutcome::Applied { .. } => working
                .checkpoints
                .last()
                .map(|c| c.summary.content.as_text())
                .unwrap_or_default(),
            _ => String::new(),
        };

        let mut reseeded = ConversationContext::new(self.session_id.clone(), new_model_id, new_context_window_tokens);
        reseeded.system_prompt = Some(Message::system(prefix, now));
        reseeded.never_compressed = working.never_compressed;
        reseeded.task = working.task;
        reseeded.architecture_decisions = working.architecture_decisions;

        *self.context.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = reseeded;

        Ok(snapshot_id)
    }

    #[must_use]
    pub fn tool_supports(&self, model_id: &str, static_profile_flag: Option<bool>, now_ms: i64) -> bool {
        self.tool_support.resolve(model_id, static_profile_flag, now_ms)
    }

    #[must_use]
    pub fn tool_support_cache(&self) -> &ToolSupportCache {
        &self.tool_support
    }

    #[must_use]
    pub fn model(&self) -> ModelInfo {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_store::FileSnapshotStore;
    use crate::vram::{FixedVramMonitor, VramInfo};
    use ccme_llm::KeywordSummarizer;

    fn manager() -> (Arc<ContextManager<FileSnapshotStore>>, tempfile::TempDir) {
        manager_with_window(10_000)
    }

    fn manager_with_window(context_window_tokens: u64) -> (Arc<ContextManager<FileSnapshotStore>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileSnapshotStore::new(dir.path()));
        let vram = Arc::new(FixedVramMonitor::new(VramInfo::abundant()));
        let model = ModelInfo {
            loaded_bytes: 0,
            bytes_per_token_f16: 2.0,
        };
        let summarizer = Arc::new(KeywordSummarizer::new());
        let manager = ContextManager::new(
            SessionId::new(),
            "test-model",
            context_window_tokens,
            CcmeSettings::default(),
            store,
            vram,
            model,
            summarizer,
            TierPolicy::Standard,
        );
        (Arc::new(manager), dir)
    }

    #[tokio::test]
    async fn add_message_is_visible_via_get_context() {
        let (manager, _dir) = manager();
        manager.add_message(Message::user("hello", 1)).await.unwrap();
        assert_eq!(manager.get_context().messages.len(), 1);
    }

    #[tokio::test]
    async fn add_message_with_zero_max_tokens_always_fails_context_full_and_skips_compression() {
        let (manager, _dir) = manager_with_window(0);
        let err = manager.add_message(Message::user("hello", 1)).await.unwrap_err();
        assert!(is_context_full(&err));
        assert!(manager.get_context().messages.is_empty());
        assert!(manager.get_context().checkpoints.is_empty(), "compression must no-op at maxTokens = 0");
    }

    #[tokio::test]
    async fn add_message_fails_context_full_when_it_cannot_fit_even_after_compression() {
        let (manager, _dir) = manager_with_window(200);
        for i in 0..6 {
            manager
                .add_message(Message::user(format!("padding message number {i}"), i))
                .await
                .unwrap();
        }
        let huge = Message::user("x".repeat(4_000), 100);
        let err = manager.add_message(huge).await.unwrap_err();
        assert!(is_context_full(&err));
    }

    #[tokio::test]
    async fn clear_drops_messages_and_emits_event() {
        let (manager, _dir) = manager();
        manager.add_message(Message::user("hello", 1)).await.unwrap();
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        let _sub = manager.on(
            EventKind::Cleared,
            Arc::new(move |_e: &Event| {
                seen_clone.store(true, Ordering::SeqCst);
            }),
        );
        manager.clear();
        assert!(manager.get_context().messages.is_empty());
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn snapshot_then_restore_roundtrips() {
        let (manager, _dir) = manager();
        manager.add_message(Message::user("hello", 1)).await.unwrap();
        let id = manager.create_snapshot(100).await.unwrap();
        manager.clear();
        assert!(manager.get_context().messages.is_empty());
        manager.restore_snapshot(&id).await.unwrap();
        assert_eq!(manager.get_context().messages.len(), 1);
    }

    #[tokio::test]
    async fn can_accept_turn_reports_limit_pressure() {
        let (manager, _dir) = manager();
        for i in 0..5 {
            manager
                .add_message(Message::user(format!("message number {i}"), i))
                .await
                .unwrap();
        }
        let validation = manager.can_accept_turn(10);
        assert_eq!(validation.context_limit, 10_000);
    }

    #[tokio::test]
    async fn process_tool_result_truncates_oversized_output() {
        let (manager, _dir) = manager();
        let huge = "x".repeat(500_000);
        let result = manager.process_tool_result("tc-1", &huge);
        assert!(result.truncated);
        assert_eq!(result.original_size, Some(huge.len()));
        assert!(result.content.len() <= TOOL_RESULT_MAX_CHARS + 200);
    }

    #[tokio::test]
    async fn process_tool_result_passes_through_small_output() {
        let (manager, _dir) = manager();
        let result = manager.process_tool_result("tc-1", "small output");
        assert!(!result.truncated);
        assert_eq!(result.content, "small output");
    }

    #[tokio::test]
    async fn hot_swap_reseeds_model_and_clears_messages() {
        let (manager, _dir) = manager();
        for i in 0..5 {
            manager.add_message(Message::user(format!("turn {i}"), i)).await.unwrap();
        }
        let _snapshot_id = manager.hot_swap("new-model", 20_000, 100).await.unwrap();
        let context = manager.get_context();
        assert_eq!(context.metadata.model_id, "new-model");
        assert_eq!(context.metadata.context_window_tokens, 20_000);
        assert!(context.messages.is_empty());
        assert!(context.system_prompt.is_some());
    }

    #[tokio::test]
    async fn update_config_rejects_invalid_settings() {
        let (manager, _dir) = manager();
        let mut bad = CcmeSettings::default();
        bad.compression.threshold = 5.0;
        assert!(manager.update_config(bad).is_err());
    }

    #[tokio::test]
    async fn update_config_triggers_resize_on_structural_change() {
        let (manager, _dir) = manager();
        let mut settings = CcmeSettings::default();
        settings.context.min_size = 8_000;
        settings.context.target_size = 8_000;
        settings.context.max_size = 64_000;
        manager.update_config(settings).unwrap();
        assert_eq!(manager.context_pool.current_size(), 8_000);
    }
}

//! Message Store: appends and edits messages against a
//! `ConversationContext` owned by the Context Manager facade, then
//! dispatches compression and snapshot scheduling on threshold crossings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ccme_core::{CcmeError, Message, MessageId, SessionId};
use ccme_settings::CcmeSettings;

use crate::constants::THRESHOLD_EPSILON;
use crate::conversation::ConversationContext;
use crate::errors::{CcmeContextError, Result};
use crate::events::{Event, EventBus};

/// Callback surface the Compression Coordinator exposes to the store so it
/// can ask "is a pass already running?" without the store depending on the
/// coordinator's full API.
pub trait CompressionScheduler: Send + Sync {
    fn is_running(&self) -> bool;
    fn schedule(&self, session_id: SessionId);
}

/// Callback surface the Snapshot Coordinator exposes for auto-snapshot
/// scheduling.
pub trait SnapshotScheduler: Send + Sync {
    fn schedule(&self, session_id: SessionId);
}

/// Callback surface the Snapshot Coordinator uses to reset the store's
/// snapshot-trigger edge tracking after a restore, so the next threshold
/// crossing fires again rather than staying suppressed from before restore.
pub trait SnapshotTriggerReset: Send + Sync {
    fn reset(&self);
}

/// Appends messages, enforces monotonic timestamps, and dispatches
/// threshold-crossing side effects.
///
/// One instance per session.
pub struct MessageStore {
    events: Arc<EventBus>,
    compression: Option<Arc<dyn CompressionScheduler>>,
    snapshots: Option<Arc<dyn SnapshotScheduler>>,
    /// `true` once usage has dropped back below `autoThreshold`, arming the
    /// store to fire the next upward crossing. Starts armed.
    snapshot_armed: AtomicBool,
    test_replay_mode: AtomicBool,
}

impl MessageStore {
    #[must_use]
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            events,
            compression: None,
            snapshots: None,
            snapshot_armed: AtomicBool::new(true),
            test_replay_mode: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_compression_scheduler(mut self, scheduler: Arc<dyn CompressionScheduler>) -> Self {
        self.compression = Some(scheduler);
        self
    }

    #[must_use]
    pub fn with_snapshot_scheduler(mut self, scheduler: Arc<dyn SnapshotScheduler>) -> Self {
        self.snapshots = Some(scheduler);
        self
    }

    /// Suppress scheduling side effects (used by deterministic replay/tests
    /// that want to drive compression manually).
    pub fn set_test_replay_mode(&self, on: bool) {
        self.test_replay_mode.store(on, Ordering::Release);
    }

    /// Re-arm the snapshot trigger so the next threshold crossing fires a
    /// fresh auto-snapshot, regardless of where usage stood before this
    /// call. Used after a restore rebuilds the live context out from under
    /// the store.
    pub fn rearm_snapshot_trigger(&self) {
        self.snapshot_armed.store(true, Ordering::Release);
    }

    /// Append an already token-counted message. Timestamps are clamped
    /// forward so the sequence stays monotonic non-decreasing even if the
    /// caller supplies a stale clock reading.
    ///
    /// Rejects with [`CcmeError::ContextFull`] — without mutating
    /// `context` — when `reserved_tokens` plus the context's current usage
    /// plus this message would exceed `max_tokens`. A `max_tokens` of zero
    /// always rejects. Callers that want to make room first should force a
    /// compression pass and call this again.
    ///
    /// # Errors
    /// Returns [`CcmeContextError::Core`] wrapping [`CcmeError::ContextFull`]
    /// when the message cannot fit.
    pub fn append(
        &self,
        context: &mut ConversationContext,
        mut message: Message,
        cached_tokens: u32,
        reserved_tokens: u64,
        settings: &CcmeSettings,
        max_tokens: u64,
    ) -> Result<()> {
        let projected = context
            .current_tokens()
            .saturating_add(u64::from(cached_tokens))
            .saturating_add(reserved_tokens);
        if max_tokens == 0 || projected > max_tokens {
            return Err(CcmeContextError::Core(CcmeError::ContextFull {
                current_tokens: projected,
                limit_tokens: max_tokens,
            }));
        }

        message.cached_tokens = Some(cached_tokens);
        if let Some(last) = context.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        context.messages.push(message);
        self.dispatch(context, settings, max_tokens);
        Ok(())
    }

    /// Replace the message with `id` in place, re-counting tokens and
    /// re-running threshold dispatch. No-op if the id is not present.
    pub fn edit(
        &self,
        context: &mut ConversationContext,
        id: &MessageId,
        new_message: Message,
        cached_tokens: u32,
        settings: &CcmeSettings,
        max_tokens: u64,
    ) -> bool {
        let Some(slot) = context.messages.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        let mut replacement = new_message;
        replacement.id = id.clone();
        replacement.cached_tokens = Some(cached_tokens);
        *slot = replacement;
        self.dispatch(context, settings, max_tokens);
        true
    }

    fn dispatch(&self, context: &ConversationContext, settings: &CcmeSettings, max_tokens: u64) {
        let current_tokens = context.current_tokens();
        let fraction = if max_tokens == 0 {
            0.0
        } else {
            current_tokens as f64 / max_tokens as f64
        };

        self.events.emit(&Event::MessageAppended {
            session_id: context.session_id.clone(),
            current_tokens,
        });

        if settings.compression.enabled && fraction + THRESHOLD_EPSILON >= settings.compression.threshold {
            let already_running = self
                .compression
                .as_ref()
                .map(|c| c.is_running())
                .unwrap_or(false);
            if !already_running && !self.test_replay_mode.load(Ordering::Acquire) {
                if let Some(scheduler) = &self.compression {
                    scheduler.schedule(context.session_id.clone());
                }
            }
        }

        if settings.snapshots.enabled && settings.snapshots.auto_create {
            let crossed = fraction + THRESHOLD_EPSILON >= settings.snapshots.auto_threshold;
            if crossed {
                if self.snapshot_armed.swap(false, Ordering::AcqRel) {
                    if let Some(scheduler) = &self.snapshots {
                        scheduler.schedule(context.session_id.clone());
                    }
                }
            } else {
                self.snapshot_armed.store(true, Ordering::Release);
            }
        }
    }
}

impl SnapshotTriggerReset for MessageStore {
    fn reset(&self) {
        self.rearm_snapshot_trigger();
    }
}

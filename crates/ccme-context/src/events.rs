//! Event bus for the context manager facade.
//!
//! Listeners are registered per [`EventKind`] and deduplicated by identity:
//! registering the same `Arc<dyn Fn>` twice for the same kind is a no-op, so
//! callers can re-subscribe defensively without firing a callback twice.

use std::sync::{Arc, Mutex};

use ccme_core::{CheckpointId, SessionId, SnapshotId};

/// The kinds of events the facade can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageAppended,
    Compressed,
    CompressionFailed,
    SnapshotCreated,
    Restored,
    Cleared,
    VramChange,
    ThresholdWarning,
    ThresholdCritical,
    ThresholdEmergency,
    Resize,
}

/// Payload carried by an emitted event.
#[derive(Clone, Debug)]
pub enum Event {
    MessageAppended {
        session_id: SessionId,
        current_tokens: u64,
    },
    Compressed {
        session_id: SessionId,
        checkpoint_id: CheckpointId,
        tokens_before: u64,
        tokens_after: u64,
        compression_number: u64,
    },
    CompressionFailed {
        session_id: SessionId,
        reason: String,
    },
    SnapshotCreated {
        session_id: SessionId,
        snapshot_id: SnapshotId,
    },
    Restored {
        session_id: SessionId,
        snapshot_id: SnapshotId,
    },
    Cleared {
        session_id: SessionId,
    },
    VramChange {
        available_fraction: f64,
    },
    Threshold {
        session_id: SessionId,
        name: &'static str,
    },
    Resize {
        session_id: SessionId,
        new_size: u64,
    },
}

impl Event {
    /// The [`EventKind`] this event corresponds to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageAppended { .. } => EventKind::MessageAppended,
            Self::Compressed { .. } => EventKind::Compressed,
            Self::CompressionFailed { .. } => EventKind::CompressionFailed,
            Self::SnapshotCreated { .. } => EventKind::SnapshotCreated,
            Self::Restored { .. } => EventKind::Restored,
            Self::Cleared { .. } => EventKind::Cleared,
            Self::VramChange { .. } => EventKind::VramChange,
            Self::Threshold { name, .. } => match *name {
                "warning" => EventKind::ThresholdWarning,
                "critical" => EventKind::ThresholdCritical,
                _ => EventKind::ThresholdEmergency,
            },
            Self::Resize { .. } => EventKind::Resize,
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Registers listeners per event kind and dispatches events to them.
///
/// Cloning a `Arc<dyn Fn>` handle and registering it twice for the same
/// kind is a no-op (identity-based dedup via `Arc::ptr_eq`).
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(EventKind, Listener)>>,
}

/// A handle returned by [`EventBus::on`] that unsubscribes the listener when
/// passed to [`EventBus::off`].
pub struct Subscription {
    kind: EventKind,
    listener: Listener,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind`. Returns a [`Subscription`] handle for
    /// unsubscribing later.
    pub fn on(&self, kind: EventKind, listener: Listener) -> Subscription {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let already_registered = listeners
            .iter()
            .any(|(k, l)| *k == kind && Arc::ptr_eq(l, &listener));
        if !already_registered {
            listeners.push((kind, Arc::clone(&listener)));
        }
        Subscription { kind, listener }
    }

    /// Remove a previously registered listener.
    pub fn off(&self, subscription: &Subscription) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|(k, l)| {
            !(*k == subscription.kind && Arc::ptr_eq(l, &subscription.listener))
        });
    }

    /// Dispatch `event` to every listener registered for its kind.
    pub fn emit(&self, event: &Event) {
        let kind = event.kind();
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for (k, listener) in listeners.iter() {
            if *k == kind {
                listener(event);
            }
        }
    }

    /// Number of listeners registered for `kind` (test/debug helper).
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

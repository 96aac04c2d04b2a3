//! Memory Guard: a polled state machine over VRAM-available
//! fraction that escalates through warning/critical/emergency and reacts by
//! calling into the Compression Coordinator, Context Pool, and Snapshot
//! Coordinator. Never mutates a `ConversationContext` directly.
//!
//! Entry conditions are expressed directly against the available fraction
//! `f` (lower `f` is worse): `f <= soft` enters warning, `f <= hard` enters
//! critical, `f <= critical` enters emergency. De-escalating to a less
//! severe state requires `f` to clear that state's own re-entry threshold
//! by [`MEMORY_GUARD_HYSTERESIS`], so a reading that oscillates right at a
//! boundary doesn't flap between states every poll.

use std::sync::{Arc, Mutex};

use ccme_core::SessionId;
use ccme_settings::types::MemoryGuardThresholds;

use crate::constants::{MEMORY_GUARD_HYSTERESIS, THRESHOLD_EPSILON};
use crate::events::{Event, EventBus};
use crate::vram::VramInfo;

/// Escalation level, ordered least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GuardState {
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl GuardState {
    fn threshold_name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Emergency => "emergency",
        }
    }
}

/// Side effects Memory Guard drives on a state change or while sustained in
/// a degraded state. Kept as a trait so the guard doesn't depend directly on
/// the Compression Coordinator, Context Pool, or Snapshot Coordinator types.
pub trait MemoryGuardActions: Send + Sync {
    /// Ask the Compression Coordinator to run a pass. `force` bypasses its
    /// own usage-threshold gate.
    fn request_compression(&self, session_id: SessionId, force: bool);
    /// Shrink the Context Pool toward its configured minimum.
    fn shrink_to_min(&self, session_id: SessionId);
    /// Create a snapshot tagged `emergency`, preserved ahead of routine
    /// cleanup.
    fn create_emergency_snapshot(&self, session_id: SessionId);
    /// Drop all but the most recent messages to claw back headroom.
    fn drop_non_recent_messages(&self, session_id: SessionId);
}

/// The state machine itself. One instance per session.
pub struct MemoryGuard {
    thresholds: MemoryGuardThresholds,
    events: Arc<EventBus>,
    state: Mutex<GuardState>,
}

impl MemoryGuard {
    #[must_use]
    pub fn new(thresholds: MemoryGuardThresholds, events: Arc<EventBus>) -> Self {
        Self {
            thresholds,
            events,
            state: Mutex::new(GuardState::Normal),
        }
    }

    #[must_use]
    pub fn current_state(&self) -> GuardState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn raw_state_for(&self, f: f64) -> GuardState {
        if f <= self.thresholds.critical {
            GuardState::Emergency
        } else if f <= self.thresholds.hard {
            GuardState::Critical
        } else if f <= self.thresholds.soft {
            GuardState::Warning
        } else {
            GuardState::Normal
        }
    }

    fn reentry_threshold(&self, state: GuardState) -> Option<f64> {
        match state {
            GuardState::Warning => Some(self.thresholds.soft),
            GuardState::Critical => Some(self.thresholds.hard),
            GuardState::Emergency => Some(self.thresholds.critical),
            GuardState::Normal => None,
        }
    }

    /// Sample VRAM telemetry and current context usage, update the state
    /// machine, and fire whatever actions the resulting state calls for.
    /// Returns the state after this poll.
    pub fn evaluate(
        &self,
        info: &VramInfo,
        usage_fraction: f64,
        compression_threshold: f64,
        session_id: &SessionId,
        actions: &dyn MemoryGuardActions,
    ) -> GuardState {
        let f = info.available_fraction();
        let raw = self.raw_state_for(f);

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = *state;
        let next = if raw < previous {
            match self.reentry_threshold(previous) {
                Some(t) if f > t + MEMORY_GUARD_HYSTERESIS => raw,
                _ => previous,
            }
        } else {
            raw
        };
        *state = next;
        drop(state);

        match next {
            GuardState::Normal => {}
            GuardState::Warning => {
                if usage_fraction + THRESHOLD_EPSILON >= compression_threshold {
                    actions.request_compression(session_id.clone(), false);
                }
            }
            GuardState::Critical => {
                actions.request_compression(session_id.clone(), true);
                actions.shrink_to_min(session_id.clone());
            }
            GuardState::Emergency => {
                actions.shrink_to_min(session_id.clone());
            }
        }

        if next != previous {
            if matches!(next, GuardState::Warning | GuardState::Critical | GuardState::Emergency) {
                self.events.emit(&Event::Threshold {
                    session_id: session_id.clone(),
                    name: next.threshold_name(),
                });
            }
            if next == GuardState::Emergency {
                actions.create_emergency_snapshot(session_id.clone());
                actions.drop_non_recent_messages(session_id.clone());
            }
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingActions {
        compression_calls: StdMutex<Vec<bool>>,
        shrink_calls: StdMutex<u32>,
        emergency_snapshots: StdMutex<u32>,
        drops: StdMutex<u32>,
    }

    impl MemoryGuardActions for RecordingActions {
        fn request_compression(&self, _session_id: SessionId, force: bool) {
            self.compression_calls.lock().unwrap().push(force);
        }
        fn shrink_to_min(&self, _session_id: SessionId) {
            *self.shrink_calls.lock().unwrap() += 1;
        }
        fn create_emergency_snapshot(&self, _session_id: SessionId) {
            *self.emergency_snapshots.lock().unwrap() += 1;
        }
        fn drop_non_recent_messages(&self, _session_id: SessionId) {
            *self.drops.lock().unwrap() += 1;
        }
    }

    fn info_with_fraction(f: f64) -> VramInfo {
        VramInfo {
            total_bytes: 1_000_000,
            used_bytes: ((1.0 - f) * 1_000_000.0) as u64,
            available_bytes: (f * 1_000_000.0) as u64,
            model_loaded_bytes: 0,
        }
    }

    fn thresholds() -> MemoryGuardThresholds {
        MemoryGuardThresholds {
            soft: 0.20,
            hard: 0.10,
            critical: 0.05,
        }
    }

    #[test]
    fn stays_normal_above_soft_threshold() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let state = guard.evaluate(&info_with_fraction(0.9), 0.0, 0.7, &SessionId::new(), &actions);
        assert_eq!(state, GuardState::Normal);
        assert!(actions.compression_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn warning_requests_non_forced_compression_only_above_usage_threshold() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let state = guard.evaluate(&info_with_fraction(0.15), 0.8, 0.7, &SessionId::new(), &actions);
        assert_eq!(state, GuardState::Warning);
        assert_eq!(actions.compression_calls.lock().unwrap().as_slice(), &[false]);
    }

    #[test]
    fn warning_skips_compression_when_usage_below_threshold() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let state = guard.evaluate(&info_with_fraction(0.15), 0.3, 0.7, &SessionId::new(), &actions);
        assert_eq!(state, GuardState::Warning);
        assert!(actions.compression_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn critical_forces_compression_and_shrinks_regardless_of_usage() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let state = guard.evaluate(&info_with_fraction(0.08), 0.0, 0.7, &SessionId::new(), &actions);
        assert_eq!(state, GuardState::Critical);
        assert_eq!(actions.compression_calls.lock().unwrap().as_slice(), &[true]);
        assert_eq!(*actions.shrink_calls.lock().unwrap(), 1);
    }

    #[test]
    fn emergency_snapshots_and_drops_only_on_transition() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let session_id = SessionId::new();

        guard.evaluate(&info_with_fraction(0.03), 0.0, 0.7, &session_id, &actions);
        guard.evaluate(&info_with_fraction(0.02), 0.0, 0.7, &session_id, &actions);
        guard.evaluate(&info_with_fraction(0.01), 0.0, 0.7, &session_id, &actions);

        assert_eq!(*actions.emergency_snapshots.lock().unwrap(), 1);
        assert_eq!(*actions.drops.lock().unwrap(), 1);
        assert_eq!(*actions.shrink_calls.lock().unwrap(), 3);
    }

    #[test]
    fn hysteresis_blocks_deescalation_just_above_raw_threshold() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let session_id = SessionId::new();

        guard.evaluate(&info_with_fraction(0.08), 0.0, 0.7, &session_id, &actions);
        assert_eq!(guard.current_state(), GuardState::Critical);

        // f now clears the raw "hard" cutoff (0.10) but not by the full
        // hysteresis margin (0.10 + 0.02) — should stay Critical.
        let state = guard.evaluate(&info_with_fraction(0.11), 0.0, 0.7, &session_id, &actions);
        assert_eq!(state, GuardState::Critical);
    }

    #[test]
    fn hysteresis_allows_deescalation_once_margin_cleared() {
        let guard = MemoryGuard::new(thresholds(), Arc::new(EventBus::new()));
        let actions = RecordingActions::default();
        let session_id = SessionId::new();

        guard.evaluate(&info_with_fraction(0.08), 0.0, 0.7, &session_id, &actions);
        assert_eq!(guard.current_state(), GuardState::Critical);

        let state = guard.evaluate(&info_with_fraction(0.13), 0.0, 0.7, &session_id, &actions);
        assert_eq!(state, GuardState::Warning);
    }
}

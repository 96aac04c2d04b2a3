//! Tunable constants for context thresholds, checkpoint aging, and the
//! tool-support override cache.

/// Context usage threshold ratios for escalating warnings.
pub struct Thresholds;

impl Thresholds {
    /// 50% — yellow zone.
    pub const WARNING: f64 = 0.50;
    /// 70% — orange zone, suggest compaction.
    pub const ALERT: f64 = 0.70;
    /// 85% — red zone, block new turns.
    pub const CRITICAL: f64 = 0.85;
    /// 95% — hard limit.
    pub const EXCEEDED: f64 = 0.95;
}

/// Tolerance applied to fractional threshold comparisons so floating-point
/// drift never causes a crossing to be missed or double-fired.
pub const THRESHOLD_EPSILON: f64 = 1e-4;

/// Hysteresis margin for Memory Guard state de-escalation.
pub const MEMORY_GUARD_HYSTERESIS: f64 = 0.02;

/// Checkpoint aging: compressions since creation before dropping to level 1.
pub const CHECKPOINT_AGE_LEVEL_1: u32 = 6;
/// Checkpoint aging: compressions since creation before dropping to level 2.
pub const CHECKPOINT_AGE_LEVEL_2: u32 = 3;

/// Cap on key decisions retained by a merged checkpoint.
pub const MERGE_MAX_DECISIONS: usize = 10;
/// Cap on file references retained by a merged checkpoint.
pub const MERGE_MAX_FILES: usize = 20;
/// Cap on key decisions harvested by `extract_critical_info`.
pub const EXTRACT_MAX_DECISIONS: usize = 5;
/// Cap on file references harvested by `extract_critical_info`.
pub const EXTRACT_MAX_FILES: usize = 10;

/// Minimum tokens allocated for a tool result, even under heavy context
/// pressure.
pub const TOOL_RESULT_MIN_TOKENS: u32 = 2_500;
/// Maximum character length for a tool result before truncation.
pub const TOOL_RESULT_MAX_CHARS: usize = 100_000;

/// How long a `user_confirmed` tool-support prompt is debounced per model.
pub const TOOL_SUPPORT_PROMPT_DEBOUNCE_SEC: u64 = 60;
/// Auto-detection probe timeout.
pub const TOOL_SUPPORT_AUTO_DETECT_TIMEOUT_MS: u64 = 5_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered() {
        assert!(Thresholds::WARNING < Thresholds::ALERT);
        assert!(Thresholds::ALERT < Thresholds::CRITICAL);
        assert!(Thresholds::CRITICAL < Thresholds::EXCEEDED);
    }

    #[test]
    fn checkpoint_aging_thresholds_ordered() {
        assert!(CHECKPOINT_AGE_LEVEL_2 < CHECKPOINT_AGE_LEVEL_1);
    }
}

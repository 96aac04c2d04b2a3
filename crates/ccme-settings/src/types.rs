//! Settings types.
//!
//! Field names follow camelCase on the wire (matching the recognized
//! configuration keys) while staying snake_case in Rust.

use serde::{Deserialize, Serialize};

/// KV-cache quantization scheme, affecting how much VRAM a token of context
/// actually costs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvQuantization {
    F16,
    Q8_0,
    Q4_0,
}

impl KvQuantization {
    /// Multiplier applied to a f16-equivalent byte cost.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::F16 => 1.0,
            Self::Q8_0 => 0.5,
            Self::Q4_0 => 0.25,
        }
    }
}

impl Default for KvQuantization {
    fn default() -> Self {
        Self::F16
    }
}

/// Compression strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    Truncate,
    Summarize,
    Hybrid,
}

impl Default for CompressionStrategy {
    fn default() -> Self {
        Self::Hybrid
    }
}

/// `context.*` — token bounds and sizing for the active window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSettings {
    pub target_size: u64,
    pub min_size: u64,
    pub max_size: u64,
    pub auto_size: bool,
    pub vram_buffer: u64,
    pub kv_quantization: KvQuantization,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            target_size: 32_000,
            min_size: 4_000,
            max_size: 128_000,
            auto_size: true,
            vram_buffer: 512 * 1024 * 1024,
            kv_quantization: KvQuantization::default(),
        }
    }
}

/// `compression.*` — when and how the active window is compacted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionSettings {
    pub enabled: bool,
    pub threshold: f64,
    pub strategy: CompressionStrategy,
    pub preserve_recent: u32,
    pub summary_max_tokens: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            strategy: CompressionStrategy::default(),
            preserve_recent: 10,
            summary_max_tokens: 2_000,
        }
    }
}

/// `snapshots.*` — automatic snapshot policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub auto_create: bool,
    pub auto_threshold: f64,
    pub max_count: u32,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_create: true,
            auto_threshold: 0.70,
            max_count: 20,
        }
    }
}

/// `memoryGuard.thresholds.*` — available-VRAM-fraction deficits that trip
/// each pressure level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryGuardThresholds {
    pub soft: f64,
    pub hard: f64,
    pub critical: f64,
}

impl Default for MemoryGuardThresholds {
    fn default() -> Self {
        Self {
            soft: 0.20,
            hard: 0.10,
            critical: 0.05,
        }
    }
}

/// `memoryGuard.*`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryGuardSettings {
    pub thresholds: MemoryGuardThresholds,
}

/// `toolSupport.*` — override-cache lifetime and detection debounce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSupportSettings {
    pub session_ttl_sec: u64,
    pub prompt_debounce_sec: u64,
}

impl Default for ToolSupportSettings {
    fn default() -> Self {
        Self {
            session_ttl_sec: 3_600,
            prompt_debounce_sec: 60,
        }
    }
}

/// Root settings document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CcmeSettings {
    pub context: ContextSettings,
    pub compression: CompressionSettings,
    pub snapshots: SnapshotSettings,
    pub memory_guard: MemoryGuardSettings,
    pub tool_support: ToolSupportSettings,
}

impl CcmeSettings {
    /// Validate cross-field invariants not expressible via field types alone.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::SettingsError::InvalidValue`] when a bound is
    /// inconsistent or a fraction falls outside `0.0..=1.0`.
    pub fn validate(&self) -> crate::errors::Result<()> {
        use crate::errors::SettingsError;

        if self.context.min_size > self.context.target_size
            || self.context.target_size > self.context.max_size
        {
            return Err(SettingsError::InvalidValue(
                "context sizes must satisfy minSize <= targetSize <= maxSize".into(),
            ));
        }
        for (name, frac) in [
            ("compression.threshold", self.compression.threshold),
            ("snapshots.autoThreshold", self.snapshots.auto_threshold),
            ("memoryGuard.thresholds.soft", self.memory_guard.thresholds.soft),
            ("memoryGuard.thresholds.hard", self.memory_guard.thresholds.hard),
            (
                "memoryGuard.thresholds.critical",
                self.memory_guard.thresholds.critical,
            ),
        ] {
            if !(0.0..=1.0).contains(&frac) {
                return Err(SettingsError::InvalidValue(format!(
                    "{name} must be a fraction in [0, 1], got {frac}"
                )));
            }
        }
        if !(self.memory_guard.thresholds.critical
            <= self.memory_guard.thresholds.hard
            && self.memory_guard.thresholds.hard <= self.memory_guard.thresholds.soft)
        {
            return Err(SettingsError::InvalidValue(
                "memoryGuard thresholds must satisfy critical <= hard <= soft".into(),
            ));
        }
        Ok(())
    }
}

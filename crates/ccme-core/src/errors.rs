//! Shared error vocabulary.
//!
//! `ccme-context` layers its own error enum on top of these kinds via
//! `#[from]`; this type is what crosses crate boundaries into `ccme-llm`
//! and `ccme-tokens` call sites that don't need the full context-specific
//! variant set.

use thiserror::Error;

/// Coarse classification used for logging and metrics grouping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller asked for something the current state can't satisfy.
    Capacity,
    /// A background maintenance operation failed.
    Maintenance,
    /// Persisted state could not be read back.
    Persistence,
    /// Supplied configuration was invalid.
    Configuration,
    /// An in-flight operation was cancelled by the caller.
    Cancellation,
    /// A requested capability isn't available for the active provider/tool.
    Unsupported,
}

/// How severe an error is, independent of its category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Caller can retry or adjust input; no data was lost.
    Warning,
    /// An operation failed outright but state remains consistent.
    Error,
    /// State may be inconsistent and needs operator attention.
    Critical,
}

/// Top-level error type shared across the engine's crates.
#[derive(Debug, Error)]
pub enum CcmeError {
    /// The context pool is at its configured maximum and cannot grow further.
    #[error("context is full: {current_tokens} tokens at limit {limit_tokens}")]
    ContextFull {
        current_tokens: u64,
        limit_tokens: u64,
    },

    /// A compression/summarization pass failed.
    #[error("compression failed: {reason}")]
    CompressionFailed { reason: String },

    /// Writing a snapshot to the store failed.
    #[error("snapshot write failed: {reason}")]
    SnapshotFailed { reason: String },

    /// A snapshot was read back but failed integrity validation.
    #[error("snapshot {snapshot_id} is corrupt: {reason}")]
    SnapshotCorrupt {
        snapshot_id: String,
        reason: String,
    },

    /// Supplied configuration failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,

    /// The active provider or tool does not support the requested capability.
    #[error("tool support unavailable: {tool_name}")]
    ToolUnsupported { tool_name: String },
}

impl CcmeError {
    /// Coarse category for logging/metrics.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ContextFull { .. } => ErrorCategory::Capacity,
            Self::CompressionFailed { .. } => ErrorCategory::Maintenance,
            Self::SnapshotFailed { .. } | Self::SnapshotCorrupt { .. } => {
                ErrorCategory::Persistence
            }
            Self::InvalidConfig { .. } => ErrorCategory::Configuration,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::ToolUnsupported { .. } => ErrorCategory::Unsupported,
        }
    }

    /// Severity classification.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::ContextFull { .. } | Self::ToolUnsupported { .. } | Self::Cancelled => {
                Severity::Warning
            }
            Self::CompressionFailed { .. } | Self::SnapshotFailed { .. } => Severity::Error,
            Self::InvalidConfig { .. } | Self::SnapshotCorrupt { .. } => Severity::Critical,
        }
    }

    /// Whether the caller can reasonably retry the same operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CompressionFailed { .. } | Self::SnapshotFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_full_is_capacity_warning() {
        let err = CcmeError::ContextFull {
            current_tokens: 100,
            limit_tokens: 100,
        };
        assert_eq!(err.category(), ErrorCategory::Capacity);
        assert_eq!(err.severity(), Severity::Warning);
        assert!(!err.is_retryable());
    }

    #[test]
    fn snapshot_corrupt_is_critical_persistence() {
        let err = CcmeError::SnapshotCorrupt {
            snapshot_id: "s-1".into(),
            reason: "checksum mismatch".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Persistence);
        assert_eq!(err.severity(), Severity::Critical);
    }

    #[test]
    fn compression_failed_is_retryable() {
        let err = CcmeError::CompressionFailed {
            reason: "summarizer timed out".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }
}

//! Context-engine error type.
//!
//! Wraps [`ccme_core::CcmeError`] with the few variants that only make
//! sense once persistence and provider calls are wired in.

use ccme_core::CcmeError;
use thiserror::Error;

/// Errors surfaced by the context engine's public operations.
#[derive(Debug, Error)]
pub enum CcmeContextError {
    /// A core error kind (`ContextFull`, `InvalidConfig`, etc.).
    #[error(transparent)]
    Core(#[from] CcmeError),

    /// The snapshot store reported an I/O failure.
    #[error("snapshot store I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// A provider call made during summarization failed.
    #[error("provider call failed during summarization: {0}")]
    Provider(String),

    /// Settings failed validation on `update_config`.
    #[error("settings error: {0}")]
    Settings(#[from] ccme_settings::SettingsError),

    /// The Snapshot Coordinator reported a failure (I/O or decode).
    #[error("snapshot coordinator error: {0}")]
    Snapshot(#[from] crate::snapshot_coordinator::SnapshotCoordinatorError),
}

/// Result alias used throughout `ccme-context`.
pub type Result<T> = std::result::Result<T, CcmeContextError>;

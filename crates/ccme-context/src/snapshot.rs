//! Snapshot data model: an immutable, self-contained,
//! version-tagged serialization of a [`ConversationContext`].

use serde::{Deserialize, Serialize};

use ccme_core::{SessionId, SnapshotId};

use crate::conversation::ConversationContext;

/// Distinguishes snapshots Memory Guard created under pressure from
/// ordinary ones, so `cleanup_old_snapshots` can preserve them first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTag {
    Emergency,
}

/// Metadata about a stored snapshot, without the (potentially large)
/// context payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: SnapshotId,
    pub session_id: SessionId,
    pub created_at: i64,
    pub tag: Option<SnapshotTag>,
}

/// The on-disk blob format version, bumped whenever the encoding changes in
/// a way readers must branch on.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A self-contained, versioned serialization of a [`ConversationContext`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub metadata: SnapshotMetadata,
    pub context: ConversationContext,
}

/// Errors encountered decoding a stored snapshot blob.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotDecodeError {
    #[error("malformed snapshot blob: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

impl Snapshot {
    #[must_use]
    pub fn new(context: ConversationContext, created_at: i64, tag: Option<SnapshotTag>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            metadata: SnapshotMetadata {
                id: SnapshotId::new(),
                session_id: context.session_id.clone(),
                created_at,
                tag,
            },
            context,
        }
    }

    /// Serialize to the store's on-disk encoding.
    ///
    /// # Errors
    /// Never expected to fail for a well-formed context, but `serde_json`'s
    /// error type is propagated rather than unwrapped.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the store's on-disk encoding, rejecting blobs from a
    /// newer format version this build doesn't understand.
    ///
    /// # Errors
    /// Returns [`SnapshotDecodeError::Malformed`] for corrupt/non-matching
    /// bytes or [`SnapshotDecodeError::UnsupportedVersion`] for a future
    /// format.
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotDecodeError> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotDecodeError::UnsupportedVersion(snapshot.format_version));
        }
        Ok(snapshot)
    }
}

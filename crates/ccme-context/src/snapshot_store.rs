//! Snapshot Store: persists and loads immutable snapshot
//! blobs indexed by session, on disk at `<base>/<sessionId>/<snapshotId>.snap`.
//!
//! Writes go to a sibling temp file followed by an atomic rename so a
//! crash mid-write never leaves a half-written `.snap` file for a reader to
//! trip over; corruption is surfaced to the caller as a decode error instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use ccme_core::{SessionId, SnapshotId};

/// Persistence contract for snapshot blobs. Blob encoding is opaque to the
/// store (the Snapshot Coordinator hands it an already-serialized
/// [`crate::snapshot::Snapshot`]).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Durably write `blob` under `session_id`/`id`.
    ///
    /// # Errors
    /// Propagates any I/O failure encountered while writing or renaming.
    async fn put(&self, session_id: &SessionId, id: &SnapshotId, blob: &[u8]) -> std::io::Result<()>;

    /// Read back a previously stored blob by id alone.
    ///
    /// # Errors
    /// Returns [`std::io::ErrorKind::NotFound`] if no blob with this id is
    /// known, or propagates the underlying read failure.
    async fn get(&self, id: &SnapshotId) -> std::io::Result<Vec<u8>>;

    /// List every snapshot id stored under `session_id`, in no particular
    /// order (callers needing newest-first order re-sort using stored
    /// metadata).
    ///
    /// # Errors
    /// Propagates a directory-read failure; an absent session directory is
    /// treated as zero snapshots, not an error.
    async fn list(&self, session_id: &SessionId) -> std::io::Result<Vec<SnapshotId>>;

    /// Remove a stored blob by id.
    ///
    /// # Errors
    /// Returns [`std::io::ErrorKind::NotFound`] if no blob with this id is
    /// known, or propagates the underlying removal failure.
    async fn delete(&self, id: &SnapshotId) -> std::io::Result<()>;

    /// The root directory blobs are stored under.
    fn base_path(&self) -> &Path;
}

/// On-disk [`SnapshotStore`] implementation.
///
/// Keeps an in-memory `id -> session_id` index populated as ids are written
/// or discovered, so `get`/`delete` by id alone don't need to scan every
/// session directory on the hot path; a miss falls back to a full scan
/// (covers a fresh process that hasn't seen a `put` for this id yet).
pub struct FileSnapshotStore {
    base_path: PathBuf,
    index: Mutex<HashMap<SnapshotId, SessionId>>,
}

impl FileSnapshotStore {
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            index: Mutex::new(HashMap::new()),
        }
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.base_path.join(session_id.as_str())
    }

    fn blob_path(&self, session_id: &SessionId, id: &SnapshotId) -> PathBuf {
        self.session_dir(session_id).join(format!("{}.snap", id.as_str()))
    }

    fn remember(&self, id: &SnapshotId, session_id: &SessionId) {
        self.index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id.clone(), session_id.clone());
    }

    fn known_session(&self, id: &SnapshotId) -> Option<SessionId> {
        self.index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Scan every session directory for `id`, populating the index on a hit.
    async fn locate(&self, id: &SnapshotId) -> std::io::Result<Option<SessionId>> {
        if let Some(session_id) = self.known_session(id) {
            return Ok(Some(session_id));
        }
        let mut sessions = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        while let Some(entry) = sessions.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let candidate = self.base_path.join(&name).join(format!("{}.snap", id.as_str()));
            if tokio::fs::try_exists(&candidate).await? {
                let session_id = SessionId::from(name);
                self.remember(id, &session_id);
                return Ok(Some(session_id));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn put(&self, session_id: &SessionId, id: &SnapshotId, blob: &[u8]) -> std::io::Result<()> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;
        let final_path = self.blob_path(session_id, id);
        let tmp_path = dir.join(format!("{}.snap.tmp", id.as_str()));
        tokio::fs::write(&tmp_path, blob).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        self.remember(id, session_id);
        debug!(session_id = %session_id, snapshot_id = %id, path = %final_path.display(), "snapshot written");
        Ok(())
    }

    async fn get(&self, id: &SnapshotId) -> std::io::Result<Vec<u8>> {
        let session_id = self
            .locate(id)
            .await?
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot id not found"))?;
        tokio::fs::read(self.blob_path(&session_id, id)).await
    }

    async fn list(&self, session_id: &SessionId) -> std::io::Result<Vec<SnapshotId>> {
        let dir = self.session_dir(session_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(id_str) = name.strip_suffix(".snap") {
                let id = SnapshotId::from(id_str);
                self.remember(&id, session_id);
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn delete(&self, id: &SnapshotId) -> std::io::Result<()> {
        let session_id = self
            .locate(id)
            .await?
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot id not found"))?;
        tokio::fs::remove_file(self.blob_path(&session_id, id)).await?;
        self.index
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }
}

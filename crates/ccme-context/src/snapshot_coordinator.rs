//! Snapshot Coordinator: creates, lists, restores, and garbage-
//! collects durable context snapshots on top of a [`SnapshotStore`].

use std::sync::Arc;

use tracing::info;

use ccme_core::{SessionId, SnapshotId};

use crate::conversation::ConversationContext;
use crate::events::{Event, EventBus};
use crate::message_store::SnapshotTriggerReset;
use crate::snapshot::{Snapshot, SnapshotDecodeError, SnapshotMetadata, SnapshotTag};
use crate::snapshot_store::SnapshotStore;

/// Errors surfaced by coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotCoordinatorError {
    #[error("snapshot store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot decode error: {0}")]
    Decode(#[from] SnapshotDecodeError),
}

/// Wraps a [`SnapshotStore`] with the context-aware operations the facade
/// and Memory Guard call into: create/list/restore/cleanup.
pub struct SnapshotCoordinator<S: SnapshotStore> {
    store: Arc<S>,
    events: Arc<EventBus>,
    trigger_reset: Option<Arc<dyn SnapshotTriggerReset>>,
}

impl<S: SnapshotStore> SnapshotCoordinator<S> {
    #[must_use]
    pub fn new(store: Arc<S>, events: Arc<EventBus>) -> Self {
        Self {
            store,
            events,
            trigger_reset: None,
        }
    }

    #[must_use]
    pub fn with_trigger_reset(mut self, reset: Arc<dyn SnapshotTriggerReset>) -> Self {
        self.trigger_reset = Some(reset);
        self
    }

    /// Serialize `context`, hand the blob to the store under its session
    /// id, and return the new snapshot id.
    ///
    /// # Errors
    /// Propagates the store's I/O failure.
    pub async fn create_snapshot(
        &self,
        context: &ConversationContext,
        created_at: i64,
        tag: Option<SnapshotTag>,
    ) -> Result<SnapshotId, SnapshotCoordinatorError> {
        let snapshot = Snapshot::new(context.clone(), created_at, tag);
        let id = snapshot.metadata.id.clone();
        let blob = snapshot
            .encode()
            .expect("serializing a ConversationContext never fails");
        self.store.put(&context.session_id, &id, &blob).await?;
        self.events.emit(&Event::SnapshotCreated {
            session_id: context.session_id.clone(),
            snapshot_id: id.clone(),
        });
        info!(session_id = %context.session_id, snapshot_id = %id, tagged = tag.is_some(), "snapshot created");
        Ok(id)
    }

    /// List metadata for every snapshot under `session_id`, newest first.
    ///
    /// # Errors
    /// Propagates the store's I/O failure or a decode failure on a corrupt
    /// blob.
    pub async fn list_snapshots(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<SnapshotMetadata>, SnapshotCoordinatorError> {
        let ids = self.store.list(session_id).await?;
        let mut metas = Vec::with_capacity(ids.len());
        for id in ids {
            let blob = self.store.get(&id).await?;
            let snapshot = Snapshot::decode(&blob)?;
            metas.push(snapshot.metadata);
        }
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(metas)
    }

    /// Read a stored blob, rebuild its `ConversationContext`, reset
    /// snapshot-trigger edge tracking, and emit `restored`.
    ///
    /// The caller (Context Manager facade) is responsible for atomically
    /// swapping the returned context into place — the coordinator has no
    /// access to the live session state.
    ///
    /// # Errors
    /// Propagates the store's I/O failure or a decode failure on a corrupt
    /// blob.
    pub async fn restore_snapshot(&self, id: &SnapshotId) -> Result<ConversationContext, SnapshotCoordinatorError> {
        let blob = self.store.get(id).await?;
        let snapshot = Snapshot::decode(&blob)?;
        if let Some(reset) = &self.trigger_reset {
            reset.reset();
        }
        self.events.emit(&Event::Restored {
            session_id: snapshot.context.session_id.clone(),
            snapshot_id: id.clone(),
        });
        info!(session_id = %snapshot.context.session_id, snapshot_id = %id, "snapshot restored");
        Ok(snapshot.context)
    }

    /// Delete the oldest snapshots beyond `keep_n`, preserving
    /// `emergency`-tagged snapshots regardless of age or count.
    ///
    /// # Errors
    /// Propagates the store's I/O failure.
    pub async fn cleanup_old_snapshots(
        &self,
        session_id: &SessionId,
        keep_n: usize,
    ) -> Result<Vec<SnapshotId>, SnapshotCoordinatorError> {
        let metas = self.list_snapshots(session_id).await?;
        let (emergency, normal): (Vec<_>, Vec<_>) =
            metas.into_iter().partition(|m| m.tag == Some(SnapshotTag::Emergency));
        let _preserved = emergency.len();

        let mut deleted = Vec::new();
        for meta in normal.into_iter().skip(keep_n) {
            self.store.delete(&meta.id).await?;
            deleted.push(meta.id);
        }
        Ok(deleted)
    }
}

//! # ccme-context
//!
//! The Conversation Context Management Engine: per-session context
//! assembly, token budgeting, tiered compression, durable snapshots, and
//! memory-pressure response.
//!
//! - **Conversation model**: [`ConversationContext`], checkpoints, never-
//!   compressed sections, and the token-budget math in [`ContextBudget`].
//! - **Message Store**: append/edit path with threshold-armed scheduling
//!   hooks for compression and snapshotting.
//! - **Compression Coordinator**: truncate/summarize/hybrid passes that
//!   merge old messages into tiered checkpoints.
//! - **Memory Guard**: a polled VRAM-pressure state machine that escalates
//!   into compression, pool shrinkage, and emergency snapshots.
//! - **Snapshot Coordinator / Store**: durable, atomically-written context
//!   snapshots with session-scoped listing and garbage collection.
//! - **Context Pool**: VRAM-aware context-window sizing.
//! - **Tool-Support Override Cache**: per-model tool-call support tracking.
//! - **Context Manager facade**: [`ContextManager`] wires all of the above
//!   around one session, plus Hot-Swap and pre-turn/tool-result budgeting.

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod compression;
pub mod constants;
pub mod context_pool;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod manager;
pub mod memory_guard;
pub mod message_store;
pub mod snapshot;
pub mod snapshot_coordinator;
pub mod snapshot_store;
pub mod tool_support;
pub mod vram;

pub use checkpoint::ModeProfile;
pub use compression::{CompressionCoordinator, CompressionOutcome, TierPolicy};
pub use context_pool::{calculate_optimal_size, ContextPool, ModelInfo};
pub use conversation::{ContextBudget, ContextUsage, ConversationContext};
pub use errors::{CcmeContextError, Result};
pub use events::{Event, EventBus, EventKind, Subscription};
pub use manager::{ContextManager, PreTurnValidation, ProcessedToolResult};
pub use memory_guard::{GuardState, MemoryGuard, MemoryGuardActions};
pub use message_store::MessageStore;
pub use snapshot::{Snapshot, SnapshotMetadata, SnapshotTag};
pub use snapshot_coordinator::{SnapshotCoordinator, SnapshotCoordinatorError};
pub use snapshot_store::{FileSnapshotStore, SnapshotStore};
pub use tool_support::{is_tool_unsupported_error, ToolSupportCache, ToolSupportProbe};
pub use vram::{poll_delay, FixedVramMonitor, HardwareVramMonitor, VramInfo, VramMonitor};

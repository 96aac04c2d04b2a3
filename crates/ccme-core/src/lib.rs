//! Foundation types shared across the conversation context engine: branded
//! IDs, the message/content data model, shared error vocabulary, and small
//! text utilities.

#![deny(unsafe_code)]

pub mod content;
pub mod errors;
pub mod ids;
pub mod message;
pub mod text;

pub use content::ContentPart;
pub use errors::{CcmeError, ErrorCategory, Severity};
pub use ids::{CheckpointId, MessageId, SessionId, SnapshotId};
pub use message::{Content, Message, Role};

//! Host adapter traits
//!
//! All methods here are synchronous: the core runs on a single cooperative
//! event loop and no host call may suspend it. Anything slow on the host
//! side must be queued behind these calls, not awaited through them.

use thiserror::Error;
use tokio::sync::mpsc;
use warden_api::Checkpoint;
use warden_util::EntityId;

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("checkpoint capture failed: {0}")]
    CaptureFailed(String),

    #[error("checkpoint restore failed: {0}")]
    RestoreFailed(String),

    #[error("entity has no active connection")]
    NotConnected,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Presence notifications from the session server
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// Entity established a connection
    Present { entity_id: EntityId },

    /// Entity lost its connection
    Absent {
        entity_id: EntityId,
        /// Host-supplied tag ("disconnect", "kicked", ...); informational only
        reason_tag: String,
    },
}

impl PresenceEvent {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            PresenceEvent::Present { entity_id } => entity_id,
            PresenceEvent::Absent { entity_id, .. } => entity_id,
        }
    }
}

/// Session lifecycle boundary.
///
/// Duplicate notifications are expected and must be tolerated downstream:
/// a `Present` for an already-present entity is a no-op for the core.
pub trait SessionLifecycle: Send + Sync {
    /// Take the presence event stream. Single consumer.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PresenceEvent>;

    /// Point-in-time presence check, used at startup reconciliation.
    fn is_currently_present(&self, entity_id: &EntityId) -> bool;
}

/// Checkpoint capture and restore.
///
/// The token is opaque to the caller; it is captured when a restriction
/// takes effect and handed back exactly once on release.
pub trait CheckpointProvider: Send + Sync {
    fn capture(&self, entity_id: &EntityId) -> HostResult<Checkpoint>;

    fn restore(&self, entity_id: &EntityId, checkpoint: Checkpoint) -> HostResult<()>;
}

//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_api::ReleaseCause;
use warden_util::EntityId;

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Restriction imposed
    RestrictionImposed {
        entity_id: EntityId,
        reason: String,
        duration: Duration,
        present: bool,
    },

    /// Restriction ended
    RestrictionReleased {
        entity_id: EntityId,
        cause: ReleaseCause,
    },

    /// Restriction extended or shortened
    RestrictionExtended {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Entity went absent, clock frozen
    RestrictionSuspended {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Entity returned, clock resumed
    RestrictionResumed {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID, assigned by the store
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp: Local::now(),
            event,
        }
    }
}

//! Event types for wardend -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_util::EntityId;

use crate::{Checkpoint, ReleaseCause, ServiceStateSnapshot, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: Local::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and major changes)
    StateChanged(ServiceStateSnapshot),

    /// A restriction was imposed
    RestrictionImposed {
        entity_id: EntityId,
        reason: String,
        remaining: Duration,
        /// False for offline imposes; the clock starts when the entity returns
        present: bool,
    },

    /// A restriction ended (manual release or expiry)
    RestrictionReleased {
        entity_id: EntityId,
        cause: ReleaseCause,
        checkpoint_restored: bool,
    },

    /// A restriction's remaining time changed
    RestrictionExtended {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Entity went absent; its clock is frozen at `remaining`
    RestrictionSuspended {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Entity returned; its clock resumed with `remaining` left
    RestrictionResumed {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Instruct the session server to restore an entity's prior state
    CheckpointRestore {
        entity_id: EntityId,
        checkpoint: Checkpoint,
    },

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::RestrictionImposed {
            entity_id: EntityId::new("entity-1"),
            reason: "No reason provided".into(),
            remaining: Duration::from_secs(900),
            present: true,
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::RestrictionImposed { .. }
        ));
    }

    #[test]
    fn suspended_event_round_trips_remaining() {
        let event = Event::new(EventPayload::RestrictionSuspended {
            entity_id: EntityId::new("entity-2"),
            remaining: Duration::from_secs(421),
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        if let EventPayload::RestrictionSuspended { remaining, .. } = parsed.payload {
            assert_eq!(remaining, Duration::from_secs(421));
        } else {
            panic!("expected RestrictionSuspended");
        }
    }
}

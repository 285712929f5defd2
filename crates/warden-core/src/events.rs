//! Events emitted by the registry

use std::time::Duration;
use warden_api::ReleaseCause;
use warden_util::EntityId;

/// One event per completed state transition, returned to the event loop
/// for broadcasting and side channels (webhooks, logs).
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// Restriction created
    Imposed {
        entity_id: EntityId,
        reason: String,
        remaining: Duration,
        present: bool,
    },

    /// Restriction ended; `checkpoint_restored` reports whether the host
    /// was asked to put the entity back
    Released {
        entity_id: EntityId,
        cause: ReleaseCause,
        checkpoint_restored: bool,
    },

    /// Remaining time changed by an extension
    Extended {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Entity went absent; clock frozen
    Suspended {
        entity_id: EntityId,
        remaining: Duration,
    },

    /// Entity returned; clock resumed
    Resumed {
        entity_id: EntityId,
        remaining: Duration,
    },
}

impl RegistryEvent {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            RegistryEvent::Imposed { entity_id, .. }
            | RegistryEvent::Released { entity_id, .. }
            | RegistryEvent::Extended { entity_id, .. }
            | RegistryEvent::Suspended { entity_id, .. }
            | RegistryEvent::Resumed { entity_id, .. } => entity_id,
        }
    }
}

//! Session-server bridge
//!
//! Implements the host-api traits over the IPC connection from the session
//! server. The server reports presence with `NotifyPresent`/`NotifyAbsent`
//! (carrying the entity's current restore token), which feeds the lifecycle
//! stream consumed by the event loop. Checkpoint capture reads the latest
//! reported token; restore is pushed back out as a `CheckpointRestore`
//! event for the session server to execute.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use warden_api::{Checkpoint, Event, EventPayload};
use warden_host_api::{CheckpointProvider, HostError, HostResult, PresenceEvent, SessionLifecycle};
use warden_util::EntityId;

/// Reason tag used when the session server supplies none
const DEFAULT_ABSENT_TAG: &str = "disconnect";

pub struct SessionBridge {
    /// Connected entities and the restore token last reported for each
    connected: Mutex<HashMap<EntityId, Option<Checkpoint>>>,
    presence_tx: mpsc::UnboundedSender<PresenceEvent>,
    presence_rx: Mutex<Option<mpsc::UnboundedReceiver<PresenceEvent>>>,
    events: broadcast::Sender<Event>,
}

impl SessionBridge {
    pub fn new(events: broadcast::Sender<Event>) -> Self {
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();

        Self {
            connected: Mutex::new(HashMap::new()),
            presence_tx,
            presence_rx: Mutex::new(Some(presence_rx)),
            events,
        }
    }

    /// Session server reported an entity connected. A token in a later
    /// report supersedes an earlier one; a report without a token keeps
    /// whatever was known.
    pub fn note_present(&self, entity_id: EntityId, checkpoint: Option<Checkpoint>) {
        {
            let mut connected = self.connected.lock().unwrap();
            let slot = connected.entry(entity_id.clone()).or_insert(None);
            if checkpoint.is_some() {
                *slot = checkpoint;
            }
        }
        let _ = self.presence_tx.send(PresenceEvent::Present { entity_id });
    }

    /// Session server reported an entity disconnected
    pub fn note_absent(&self, entity_id: EntityId, reason_tag: Option<String>) {
        self.connected.lock().unwrap().remove(&entity_id);
        let _ = self.presence_tx.send(PresenceEvent::Absent {
            entity_id,
            reason_tag: reason_tag.unwrap_or_else(|| DEFAULT_ABSENT_TAG.to_string()),
        });
    }

    /// Replace the connected set wholesale (sent by the session server
    /// after either side restarts). Does not emit presence events; the
    /// caller runs registry reconciliation against the new set.
    pub fn sync_presence(&self, entity_ids: Vec<EntityId>) {
        let mut connected = self.connected.lock().unwrap();
        let mut next = HashMap::new();
        for entity_id in entity_ids {
            let checkpoint = connected.remove(&entity_id).flatten();
            next.insert(entity_id, checkpoint);
        }
        *connected = next;
        debug!(count = connected.len(), "Presence set synced");
    }
}

impl SessionLifecycle for SessionBridge {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PresenceEvent> {
        self.presence_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }

    fn is_currently_present(&self, entity_id: &EntityId) -> bool {
        self.connected.lock().unwrap().contains_key(entity_id)
    }
}

impl CheckpointProvider for SessionBridge {
    fn capture(&self, entity_id: &EntityId) -> HostResult<Checkpoint> {
        match self.connected.lock().unwrap().get(entity_id) {
            Some(Some(checkpoint)) => Ok(checkpoint.clone()),
            Some(None) => Err(HostError::CaptureFailed(
                "no restore token reported for entity".into(),
            )),
            None => Err(HostError::NotConnected),
        }
    }

    fn restore(&self, entity_id: &EntityId, checkpoint: Checkpoint) -> HostResult<()> {
        // Fire-and-forget: the session server executes the restore.
        let _ = self.events.send(Event::new(EventPayload::CheckpointRestore {
            entity_id: entity_id.clone(),
            checkpoint,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_api::CheckpointPayload;

    fn bridge() -> SessionBridge {
        let (events, _) = broadcast::channel(16);
        SessionBridge::new(events)
    }

    fn token(id: u64) -> Checkpoint {
        Checkpoint::new(CheckpointPayload::Mock { id })
    }

    #[test]
    fn capture_reads_latest_reported_token() {
        let bridge = bridge();
        let entity = EntityId::new("a");

        assert!(matches!(
            bridge.capture(&entity),
            Err(HostError::NotConnected)
        ));

        bridge.note_present(entity.clone(), Some(token(1)));
        bridge.note_present(entity.clone(), Some(token(2)));
        assert_eq!(bridge.capture(&entity).unwrap(), token(2));

        // A report without a token keeps the known one
        bridge.note_present(entity.clone(), None);
        assert_eq!(bridge.capture(&entity).unwrap(), token(2));
    }

    #[test]
    fn absence_clears_the_token() {
        let bridge = bridge();
        let entity = EntityId::new("a");

        bridge.note_present(entity.clone(), Some(token(1)));
        bridge.note_absent(entity.clone(), None);

        assert!(!bridge.is_currently_present(&entity));
        assert!(bridge.capture(&entity).is_err());
    }

    #[test]
    fn presence_events_reach_the_subscriber() {
        let bridge = bridge();
        let mut rx = bridge.subscribe();
        let entity = EntityId::new("a");

        bridge.note_present(entity.clone(), None);
        bridge.note_absent(entity.clone(), Some("kicked".into()));

        assert!(matches!(
            rx.try_recv().unwrap(),
            PresenceEvent::Present { .. }
        ));
        match rx.try_recv().unwrap() {
            PresenceEvent::Absent { reason_tag, .. } => assert_eq!(reason_tag, "kicked"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn sync_replaces_the_connected_set() {
        let bridge = bridge();
        let a = EntityId::new("a");
        let b = EntityId::new("b");

        bridge.note_present(a.clone(), Some(token(1)));
        bridge.note_present(b.clone(), Some(token(2)));

        bridge.sync_presence(vec![a.clone(), EntityId::new("c")]);

        assert!(bridge.is_currently_present(&a));
        assert!(!bridge.is_currently_present(&b));
        assert!(bridge.is_currently_present(&EntityId::new("c")));

        // Token survived for the retained entity
        assert_eq!(bridge.capture(&a).unwrap(), token(1));
    }

    #[test]
    fn restore_broadcasts_to_event_subscribers() {
        let (events, mut event_rx) = broadcast::channel(16);
        let bridge = SessionBridge::new(events);
        let entity = EntityId::new("a");

        bridge.restore(&entity, token(9)).unwrap();

        let event = event_rx.try_recv().unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::CheckpointRestore { .. }
        ));
    }
}

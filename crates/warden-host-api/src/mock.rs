//! Mock host for testing

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use warden_api::{Checkpoint, CheckpointPayload};
use warden_util::EntityId;

use crate::{CheckpointProvider, HostError, HostResult, PresenceEvent, SessionLifecycle};

/// Mock session host for unit/integration testing.
///
/// Presence is scripted with [`connect`](MockHost::connect) /
/// [`disconnect`](MockHost::disconnect); captures hand out numbered mock
/// checkpoints and restores are recorded for assertions.
pub struct MockHost {
    present: Mutex<HashSet<EntityId>>,
    next_checkpoint: AtomicU64,
    restored: Mutex<Vec<(EntityId, Checkpoint)>>,
    fail_capture: AtomicBool,
    event_tx: mpsc::UnboundedSender<PresenceEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<PresenceEvent>>>,
}

impl MockHost {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            present: Mutex::new(HashSet::new()),
            next_checkpoint: AtomicU64::new(1),
            restored: Mutex::new(Vec::new()),
            fail_capture: AtomicBool::new(false),
            event_tx: tx,
            event_rx: Mutex::new(Some(rx)),
        }
    }

    /// Mark an entity connected and emit a `Present` event.
    pub fn connect(&self, entity_id: &EntityId) {
        self.present.lock().unwrap().insert(entity_id.clone());
        let _ = self.event_tx.send(PresenceEvent::Present {
            entity_id: entity_id.clone(),
        });
    }

    /// Mark an entity disconnected and emit an `Absent` event.
    pub fn disconnect(&self, entity_id: &EntityId, reason_tag: &str) {
        self.present.lock().unwrap().remove(entity_id);
        let _ = self.event_tx.send(PresenceEvent::Absent {
            entity_id: entity_id.clone(),
            reason_tag: reason_tag.to_string(),
        });
    }

    /// Mark an entity connected without emitting an event (for seeding
    /// reconciliation scenarios).
    pub fn set_present_silently(&self, entity_id: &EntityId) {
        self.present.lock().unwrap().insert(entity_id.clone());
    }

    /// Configure capture to fail
    pub fn set_fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    /// All restores performed so far, in order.
    pub fn restored(&self) -> Vec<(EntityId, Checkpoint)> {
        self.restored.lock().unwrap().clone()
    }

    /// How many checkpoints have been handed out.
    pub fn captures(&self) -> u64 {
        self.next_checkpoint.load(Ordering::SeqCst) - 1
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle for MockHost {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PresenceEvent> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }

    fn is_currently_present(&self, entity_id: &EntityId) -> bool {
        self.present.lock().unwrap().contains(entity_id)
    }
}

impl CheckpointProvider for MockHost {
    fn capture(&self, entity_id: &EntityId) -> HostResult<Checkpoint> {
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(HostError::CaptureFailed("mock capture failure".into()));
        }
        if !self.is_currently_present(entity_id) {
            return Err(HostError::NotConnected);
        }

        let id = self.next_checkpoint.fetch_add(1, Ordering::SeqCst);
        Ok(Checkpoint::new(CheckpointPayload::Mock { id }))
    }

    fn restore(&self, entity_id: &EntityId, checkpoint: Checkpoint) -> HostResult<()> {
        self.restored
            .lock()
            .unwrap()
            .push((entity_id.clone(), checkpoint));
        Ok(())
    }
}

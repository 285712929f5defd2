//! The restriction registry
//!
//! Single authoritative table of restriction records, keyed by entity id.
//! All mutations run on the event-loop thread; the store only ever sees a
//! write-through snapshot of this table and is never consulted during
//! normal operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use chrono::Local;
use warden_api::{ReleaseCause, RestrictionView, ServiceStateSnapshot, API_VERSION};
use warden_host_api::{CheckpointProvider, SessionLifecycle};
use warden_store::{AuditEvent, AuditEventType, Store, StoredRestriction};
use warden_util::{EntityId, MonotonicInstant, RestrictionError};

use crate::{RegistryEvent, ReleaseScheduler, RestrictionRecord, TemporalState};

/// Reason recorded when a command supplies none
const DEFAULT_REASON: &str = "No reason provided";

/// Authoritative restriction state and transition logic.
pub struct RestrictionRegistry {
    records: HashMap<EntityId, RestrictionRecord>,
    scheduler: ReleaseScheduler,
    store: Arc<dyn Store>,
    checkpoints: Arc<dyn CheckpointProvider>,
    default_duration: Duration,
}

impl RestrictionRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        checkpoints: Arc<dyn CheckpointProvider>,
        default_duration: Duration,
    ) -> Self {
        Self {
            records: HashMap::new(),
            scheduler: ReleaseScheduler::new(),
            store,
            checkpoints,
            default_duration,
        }
    }

    /// Install records loaded from the store. Every record starts absent
    /// (no deadline is trusted across a restart) and stays frozen until
    /// [`reconcile`](Self::reconcile) or a presence event promotes it.
    pub fn hydrate(&mut self, stored: Vec<StoredRestriction>) {
        for row in stored {
            let record = RestrictionRecord::from_stored(row);
            self.records.insert(record.entity_id.clone(), record);
        }
        info!(count = self.records.len(), "Restriction records loaded");
    }

    /// Startup reconciliation: promote every loaded record whose entity the
    /// host reports present, re-arming its release timer.
    pub fn reconcile(
        &mut self,
        lifecycle: &dyn SessionLifecycle,
        now: MonotonicInstant,
    ) -> Vec<RegistryEvent> {
        let entity_ids: Vec<EntityId> = self.records.keys().cloned().collect();
        entity_ids
            .into_iter()
            .filter(|entity_id| lifecycle.is_currently_present(entity_id))
            .filter_map(|entity_id| self.on_presence_changed(&entity_id, true, now))
            .collect()
    }

    /// Impose a restriction.
    ///
    /// `duration` falls back to the configured default; zero is rejected.
    /// When the entity is present the checkpoint is captured and the release
    /// timer armed; otherwise the record is created frozen.
    pub fn impose(
        &mut self,
        entity_id: &EntityId,
        duration: Option<Duration>,
        reason: Option<String>,
        present: bool,
        now: MonotonicInstant,
    ) -> Result<RegistryEvent, RestrictionError> {
        if self.records.contains_key(entity_id) {
            return Err(RestrictionError::AlreadyRestricted(entity_id.clone()));
        }

        let duration = duration.unwrap_or(self.default_duration);
        if duration.is_zero() {
            return Err(RestrictionError::InvalidDuration(
                "duration must be positive".into(),
            ));
        }
        let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());

        let checkpoint = if present {
            match self.checkpoints.capture(entity_id) {
                Ok(checkpoint) => Some(checkpoint),
                Err(e) => {
                    warn!(entity_id = %entity_id, error = %e, "Checkpoint capture failed");
                    None
                }
            }
        } else {
            None
        };

        let temporal = if present {
            TemporalState::Deadline(now + duration)
        } else {
            TemporalState::Remaining(duration)
        };

        let record = RestrictionRecord {
            entity_id: entity_id.clone(),
            reason: reason.clone(),
            temporal,
            checkpoint,
            generation: 0,
            imposed_at: Local::now(),
        };

        if present {
            self.scheduler
                .arm(entity_id.clone(), now + duration, record.generation);
        }
        self.records.insert(entity_id.clone(), record);

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RestrictionImposed {
                entity_id: entity_id.clone(),
                reason: reason.clone(),
                duration,
                present,
            }));
        self.persist(now);

        info!(
            entity_id = %entity_id,
            duration_secs = duration.as_secs(),
            present,
            reason = %reason,
            "Restriction imposed"
        );

        Ok(RegistryEvent::Imposed {
            entity_id: entity_id.clone(),
            reason,
            remaining: duration,
            present,
        })
    }

    /// Manually release a restriction. The second call for the same entity
    /// fails with `NotRestricted`; the checkpoint is never restored twice.
    pub fn release(
        &mut self,
        entity_id: &EntityId,
        now: MonotonicInstant,
    ) -> Result<RegistryEvent, RestrictionError> {
        self.remove_record(entity_id, now, ReleaseCause::Released)
            .ok_or_else(|| RestrictionError::NotRestricted(entity_id.clone()))
    }

    /// Add `delta` (which may be negative) to the remaining time. A result
    /// at or below zero expires the restriction immediately rather than
    /// storing a non-positive remaining span.
    pub fn extend(
        &mut self,
        entity_id: &EntityId,
        delta: chrono::Duration,
        now: MonotonicInstant,
    ) -> Result<RegistryEvent, RestrictionError> {
        let current = match self.records.get(entity_id) {
            Some(record) => record.temporal.remaining(now),
            None => return Err(RestrictionError::NotRestricted(entity_id.clone())),
        };

        let new_secs = i64::try_from(current.as_secs())
            .unwrap_or(i64::MAX)
            .saturating_add(delta.num_seconds());

        if new_secs <= 0 {
            return self
                .remove_record(entity_id, now, ReleaseCause::Expired)
                .ok_or_else(|| RestrictionError::NotRestricted(entity_id.clone()));
        }
        let remaining = Duration::from_secs(new_secs as u64);

        let Some(record) = self.records.get_mut(entity_id) else {
            return Err(RestrictionError::NotRestricted(entity_id.clone()));
        };
        let generation = record.bump();
        let present = record.temporal.is_present();
        record.temporal = if present {
            TemporalState::Deadline(now + remaining)
        } else {
            TemporalState::Remaining(remaining)
        };
        if present {
            self.scheduler
                .arm(entity_id.clone(), now + remaining, generation);
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RestrictionExtended {
                entity_id: entity_id.clone(),
                remaining,
            }));
        self.persist(now);

        info!(
            entity_id = %entity_id,
            delta_secs = delta.num_seconds(),
            remaining_secs = remaining.as_secs(),
            "Restriction extended"
        );

        Ok(RegistryEvent::Extended {
            entity_id: entity_id.clone(),
            remaining,
        })
    }

    /// Presence toggle from the session lifecycle. No-op for entities
    /// without a record and for duplicate notifications; otherwise converts
    /// between the deadline and frozen forms and arms/disarms the timer.
    pub fn on_presence_changed(
        &mut self,
        entity_id: &EntityId,
        present: bool,
        now: MonotonicInstant,
    ) -> Option<RegistryEvent> {
        let (was_present, remaining, has_checkpoint) = match self.records.get(entity_id) {
            Some(record) => (
                record.temporal.is_present(),
                record.temporal.remaining(now),
                record.checkpoint.is_some(),
            ),
            None => return None,
        };

        if present == was_present {
            return None;
        }

        if remaining.is_zero() {
            // Deadline already passed while the notification was queued.
            return self.remove_record(entity_id, now, ReleaseCause::Expired);
        }

        if present {
            // Returning from absence: the clock resumes. A record imposed in
            // absence has no checkpoint yet; capture one now so release can
            // put the entity back where it connected.
            let captured = if has_checkpoint {
                None
            } else {
                match self.checkpoints.capture(entity_id) {
                    Ok(checkpoint) => Some(checkpoint),
                    Err(e) => {
                        warn!(entity_id = %entity_id, error = %e, "Checkpoint capture failed");
                        None
                    }
                }
            };

            let record = self.records.get_mut(entity_id)?;
            if captured.is_some() {
                record.checkpoint = captured;
            }
            let generation = record.bump();
            record.temporal = TemporalState::Deadline(now + remaining);
            self.scheduler
                .arm(entity_id.clone(), now + remaining, generation);

            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::RestrictionResumed {
                    entity_id: entity_id.clone(),
                    remaining,
                }));
            self.persist(now);

            info!(
                entity_id = %entity_id,
                remaining_secs = remaining.as_secs(),
                "Restriction resumed"
            );

            Some(RegistryEvent::Resumed {
                entity_id: entity_id.clone(),
                remaining,
            })
        } else {
            // Going absent: freeze the clock. Absence time never counts.
            let record = self.records.get_mut(entity_id)?;
            record.bump();
            record.temporal = TemporalState::Remaining(remaining);
            self.scheduler.disarm(entity_id);

            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::RestrictionSuspended {
                    entity_id: entity_id.clone(),
                    remaining,
                }));
            self.persist(now);

            info!(
                entity_id = %entity_id,
                remaining_secs = remaining.as_secs(),
                "Restriction suspended"
            );

            Some(RegistryEvent::Suspended {
                entity_id: entity_id.clone(),
                remaining,
            })
        }
    }

    /// Drive pending releases. Called from the event loop's tick.
    pub fn tick(&mut self, now: MonotonicInstant) -> Vec<RegistryEvent> {
        self.scheduler
            .due(now)
            .into_iter()
            .filter_map(|(entity_id, generation)| self.on_release_due(&entity_id, generation, now))
            .collect()
    }

    /// A scheduled release came due. Validates the generation captured at
    /// arm time against the live record: a mismatch means the record was
    /// superseded (extended, released, or presence-toggled) since arming,
    /// and the fire is a silent no-op: the expected outcome of the
    /// cancel-then-fire race, not a fault.
    pub fn on_release_due(
        &mut self,
        entity_id: &EntityId,
        generation: u64,
        now: MonotonicInstant,
    ) -> Option<RegistryEvent> {
        let live = match self.records.get(entity_id) {
            Some(record) => record.generation,
            None => {
                debug!(entity_id = %entity_id, "Release fired for a removed record");
                return None;
            }
        };

        if live != generation {
            debug!(
                entity_id = %entity_id,
                armed_generation = generation,
                live_generation = live,
                "Stale release timer ignored"
            );
            return None;
        }

        self.remove_record(entity_id, now, ReleaseCause::Expired)
    }

    /// Enforcement/status read: live snapshot, no side effects.
    pub fn query(&self, entity_id: &EntityId, now: MonotonicInstant) -> Option<RestrictionView> {
        self.records.get(entity_id).map(|record| record.view(now))
    }

    /// All active restrictions, ordered by entity id.
    pub fn list(&self, now: MonotonicInstant) -> Vec<RestrictionView> {
        let mut views: Vec<RestrictionView> =
            self.records.values().map(|record| record.view(now)).collect();
        views.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        views
    }

    pub fn is_restricted(&self, entity_id: &EntityId) -> bool {
        self.records.contains_key(entity_id)
    }

    pub fn restricted_count(&self) -> usize {
        self.records.len()
    }

    /// Full state snapshot for clients
    pub fn state_snapshot(&self, now: MonotonicInstant) -> ServiceStateSnapshot {
        ServiceStateSnapshot {
            api_version: API_VERSION,
            restriction_count: self.records.len(),
            restrictions: self.list(now),
        }
    }

    /// Earliest pending auto-release, if any
    pub fn next_release_at(&self) -> Option<MonotonicInstant> {
        self.scheduler.next_fire_at()
    }

    /// Freeze every present record, as if each entity disconnected. Used at
    /// shutdown so only relative durations are persisted.
    pub fn suspend_all(&mut self, now: MonotonicInstant) -> Vec<RegistryEvent> {
        let present: Vec<EntityId> = self
            .records
            .iter()
            .filter(|(_, record)| record.temporal.is_present())
            .map(|(entity_id, _)| entity_id.clone())
            .collect();

        present
            .into_iter()
            .filter_map(|entity_id| self.on_presence_changed(&entity_id, false, now))
            .collect()
    }

    /// Write the current table to the store (heartbeat / shutdown path;
    /// every mutation already writes through).
    pub fn write_snapshot(&self, now: MonotonicInstant) {
        self.persist(now);
    }

    /// Shared release path for manual lift and expiry. Restores the
    /// checkpoint only while the entity is present; an absent entity's
    /// checkpoint is discarded with the record.
    fn remove_record(
        &mut self,
        entity_id: &EntityId,
        now: MonotonicInstant,
        cause: ReleaseCause,
    ) -> Option<RegistryEvent> {
        let record = self.records.remove(entity_id)?;
        self.scheduler.disarm(entity_id);

        let mut checkpoint_restored = false;
        if record.temporal.is_present() {
            if let Some(checkpoint) = record.checkpoint {
                match self.checkpoints.restore(entity_id, checkpoint) {
                    Ok(()) => checkpoint_restored = true,
                    Err(e) => {
                        warn!(entity_id = %entity_id, error = %e, "Checkpoint restore failed")
                    }
                }
            }
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RestrictionReleased {
                entity_id: entity_id.clone(),
                cause,
            }));
        self.persist(now);

        info!(entity_id = %entity_id, cause = ?cause, "Restriction lifted");

        Some(RegistryEvent::Released {
            entity_id: entity_id.clone(),
            cause,
            checkpoint_restored,
        })
    }

    fn persist(&self, now: MonotonicInstant) {
        let rows: Vec<StoredRestriction> = self
            .records
            .values()
            .map(|record| record.to_stored(now))
            .collect();

        if let Err(e) = self.store.replace_restrictions(&rows) {
            warn!(error = %e, "Failed to write restriction snapshot");
        }
    }
}

//! Release scheduler
//!
//! Keeps at most one pending auto-release per entity. Entries are plain
//! `(fire_at, generation)` data, with no captured closures. The
//! registry re-reads live state when an entry comes due and discards it if
//! the generation no longer matches, which closes the cancel-then-fire gap
//! left by best-effort disarming.

use std::collections::HashMap;
use warden_util::{EntityId, MonotonicInstant};

#[derive(Debug, Clone, Copy)]
struct PendingRelease {
    fire_at: MonotonicInstant,
    generation: u64,
}

/// One-shot release timers, drained by the event loop's tick.
#[derive(Debug, Default)]
pub struct ReleaseScheduler {
    pending: HashMap<EntityId, PendingRelease>,
}

impl ReleaseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a release. Replaces any pending entry for the entity.
    pub fn arm(&mut self, entity_id: EntityId, fire_at: MonotonicInstant, generation: u64) {
        self.pending
            .insert(entity_id, PendingRelease { fire_at, generation });
    }

    /// Cancel a pending release. Best-effort: an entry already drained by
    /// `due` can still reach the registry, where the generation check
    /// rejects it.
    pub fn disarm(&mut self, entity_id: &EntityId) {
        self.pending.remove(entity_id);
    }

    /// Remove and return every entry due at `now` with the generation it
    /// was armed with.
    pub fn due(&mut self, now: MonotonicInstant) -> Vec<(EntityId, u64)> {
        let mut fired = Vec::new();
        self.pending.retain(|entity_id, entry| {
            if entry.fire_at <= now {
                fired.push((entity_id.clone(), entry.generation));
                false
            } else {
                true
            }
        });
        fired
    }

    /// Earliest pending fire instant, if any
    pub fn next_fire_at(&self) -> Option<MonotonicInstant> {
        self.pending.values().map(|entry| entry.fire_at).min()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn due_drains_only_ripe_entries() {
        let mut scheduler = ReleaseScheduler::new();
        let now = MonotonicInstant::now();

        scheduler.arm(EntityId::new("a"), now + Duration::from_secs(10), 0);
        scheduler.arm(EntityId::new("b"), now + Duration::from_secs(20), 0);

        assert!(scheduler.due(now + Duration::from_secs(5)).is_empty());

        let fired = scheduler.due(now + Duration::from_secs(15));
        assert_eq!(fired, vec![(EntityId::new("a"), 0)]);
        assert_eq!(scheduler.pending_count(), 1);

        // Already drained; does not fire twice
        assert!(scheduler.due(now + Duration::from_secs(15)).is_empty());
    }

    #[test]
    fn arm_replaces_pending_entry() {
        let mut scheduler = ReleaseScheduler::new();
        let now = MonotonicInstant::now();
        let entity = EntityId::new("a");

        scheduler.arm(entity.clone(), now + Duration::from_secs(10), 0);
        scheduler.arm(entity.clone(), now + Duration::from_secs(30), 1);

        assert_eq!(scheduler.pending_count(), 1);
        assert!(scheduler.due(now + Duration::from_secs(15)).is_empty());

        let fired = scheduler.due(now + Duration::from_secs(31));
        assert_eq!(fired, vec![(entity, 1)]);
    }

    #[test]
    fn disarm_cancels() {
        let mut scheduler = ReleaseScheduler::new();
        let now = MonotonicInstant::now();
        let entity = EntityId::new("a");

        scheduler.arm(entity.clone(), now + Duration::from_secs(10), 0);
        scheduler.disarm(&entity);

        assert!(scheduler.due(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn next_fire_at_is_the_minimum() {
        let mut scheduler = ReleaseScheduler::new();
        let now = MonotonicInstant::now();

        assert!(scheduler.next_fire_at().is_none());

        scheduler.arm(EntityId::new("a"), now + Duration::from_secs(20), 0);
        scheduler.arm(EntityId::new("b"), now + Duration::from_secs(10), 0);

        assert_eq!(scheduler.next_fire_at(), Some(now + Duration::from_secs(10)));
    }
}

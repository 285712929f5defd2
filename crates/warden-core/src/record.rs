//! Restriction record and temporal state

use chrono::{DateTime, Local};
use std::time::Duration;
use warden_api::{Checkpoint, RestrictionView};
use warden_store::StoredRestriction;
use warden_util::{EntityId, MonotonicInstant};

/// Temporal encoding of a restriction. The variant *is* the presence state:
/// `Deadline` holds only while the entity has a connection, because an
/// absolute instant computed on one clock means nothing to the clock the
/// record may later be read under. The moment the entity is absent (or the
/// process is down) only the relative `Remaining` form is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalState {
    /// Instant at which the restriction auto-lifts; entity is present
    Deadline(MonotonicInstant),

    /// Restriction time left, frozen; entity is absent
    Remaining(Duration),
}

impl TemporalState {
    /// Live remaining time as of `now`
    pub fn remaining(&self, now: MonotonicInstant) -> Duration {
        match self {
            TemporalState::Deadline(deadline) => deadline.saturating_duration_until(now),
            TemporalState::Remaining(remaining) => *remaining,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, TemporalState::Deadline(_))
    }
}

/// One active restriction. Owned exclusively by the registry; everything
/// handed outward is a [`RestrictionView`] copy.
#[derive(Debug, Clone)]
pub struct RestrictionRecord {
    pub entity_id: EntityId,

    /// Display-only, never authoritative
    pub reason: String,

    pub temporal: TemporalState,

    /// Restore token, captured when the restriction takes effect while
    /// present (or at first return from absence); cleared on release
    pub checkpoint: Option<Checkpoint>,

    /// Bumped on every mutation. A scheduled release fires only if the
    /// generation it captured at arm time still matches.
    pub generation: u64,

    /// Wall clock, display and audit only
    pub imposed_at: DateTime<Local>,
}

impl RestrictionRecord {
    /// Increment the generation and return the new value
    pub fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Durable form: always relative, whatever the live variant
    pub fn to_stored(&self, now: MonotonicInstant) -> StoredRestriction {
        StoredRestriction {
            entity_id: self.entity_id.clone(),
            reason: self.reason.clone(),
            remaining: self.temporal.remaining(now),
            checkpoint: self.checkpoint.clone(),
            imposed_at: self.imposed_at,
        }
    }

    /// Rebuild from durable form. Every loaded record starts absent; the
    /// registry promotes present entities during reconciliation.
    pub fn from_stored(stored: StoredRestriction) -> Self {
        Self {
            entity_id: stored.entity_id,
            reason: stored.reason,
            temporal: TemporalState::Remaining(stored.remaining),
            checkpoint: stored.checkpoint,
            generation: 0,
            imposed_at: stored.imposed_at,
        }
    }

    /// Read-only snapshot with the remaining time computed live
    pub fn view(&self, now: MonotonicInstant) -> RestrictionView {
        RestrictionView {
            entity_id: self.entity_id.clone(),
            reason: self.reason.clone(),
            remaining: self.temporal.remaining(now),
            present: self.temporal.is_present(),
            imposed_at: self.imposed_at,
        }
    }
}

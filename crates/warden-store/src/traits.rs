//! Store trait definitions

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_api::Checkpoint;
use warden_util::EntityId;

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Restriction snapshot

    /// Load every stored restriction. Reload is a full-table replace on the
    /// caller's side, never a merge.
    fn load_restrictions(&self) -> StoreResult<Vec<StoredRestriction>>;

    /// Replace the stored restriction set with `records`, atomically.
    fn replace_restrictions(&self, records: &[StoredRestriction]) -> StoreResult<()>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if the store is healthy
    fn is_healthy(&self) -> bool;
}

/// Durable form of one restriction.
///
/// The remaining time is always stored relative: an absolute deadline
/// computed on one clock cannot be trusted when the record is re-read under
/// another after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRestriction {
    pub entity_id: EntityId,
    pub reason: String,
    pub remaining: Duration,
    pub checkpoint: Option<Checkpoint>,
    pub imposed_at: DateTime<Local>,
}

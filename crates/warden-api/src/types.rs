//! Shared types for the wardend API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_util::EntityId;

/// Opaque token capturing enough host state to reverse a restriction on
/// release (typically where to place the entity back). The core never
/// inspects the payload; it only stores it with the record and hands it
/// back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    payload: CheckpointPayload,
}

impl Checkpoint {
    pub fn new(payload: CheckpointPayload) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &CheckpointPayload {
        &self.payload
    }
}

/// Host-specific checkpoint payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointPayload {
    /// World position to return the entity to
    Position { x: f64, y: f64, z: f64 },

    /// Arbitrary host-defined payload
    Custom {
        type_name: String,
        payload: serde_json::Value,
    },

    /// Mock for testing
    Mock { id: u64 },
}

/// Read-only snapshot of one active restriction.
///
/// `remaining` is computed live at query time; a view is never a handle
/// into registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionView {
    pub entity_id: EntityId,
    pub reason: String,
    pub remaining: Duration,
    /// Whether the entity currently holds a connection (the clock only runs
    /// while this is true)
    pub present: bool,
    pub imposed_at: DateTime<Local>,
}

/// Why a restriction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCause {
    /// Remaining time ran out (including an extension shortening it past zero)
    Expired,
    /// Manual release
    Released,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub restriction_count: usize,
    pub restrictions: Vec<RestrictionView>,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
}

/// Restriction policy as seen by clients (the session server reads this
/// once at connect to know where to confine entities and what to show them)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyInfo {
    pub default_duration: Duration,
    pub holding_zone: String,
    pub rules_url: Option<String>,
}

/// Role for authorization: a single admin/user split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Can impose, release, extend, and report presence
    Admin,
    /// Read-only: state, listings, queries
    Observer,
}

impl ClientRole {
    pub fn can_mutate(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_serialization() {
        let checkpoint = Checkpoint::new(CheckpointPayload::Position {
            x: 12.5,
            y: 0.1,
            z: -340.0,
        });

        let json = serde_json::to_string(&checkpoint).unwrap();
        assert!(json.contains("position"));
        let parsed: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(checkpoint, parsed);
    }

    #[test]
    fn release_cause_serialization() {
        let json = serde_json::to_string(&ReleaseCause::Expired).unwrap();
        assert_eq!(json, "\"expired\"");
    }

    #[test]
    fn observer_cannot_mutate() {
        assert!(ClientRole::Admin.can_mutate());
        assert!(!ClientRole::Observer.can_mutate());
    }
}

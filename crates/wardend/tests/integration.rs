//! Integration tests for wardend
//!
//! These drive the restriction core end-to-end against the mock session
//! host and a real SQLite store, covering the disconnect/restart/override
//! scenarios the daemon exists to survive.

use std::sync::Arc;
use std::time::Duration;
use warden_api::ReleaseCause;
use warden_core::{RegistryEvent, RestrictionRegistry};
use warden_host_api::MockHost;
use warden_store::{AuditEventType, SqliteStore, Store};
use warden_util::{EntityId, MonotonicInstant};

const DEFAULT_DURATION: Duration = Duration::from_secs(15 * 60);

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

#[test]
fn full_restriction_lifecycle_with_disconnect() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let host = Arc::new(MockHost::new());
    let mut registry = RestrictionRegistry::new(store.clone(), host.clone(), DEFAULT_DURATION);

    let entity = EntityId::new("76561198000000001");
    host.connect(&entity);
    let t0 = MonotonicInstant::now();

    // Impose 10 minutes while present
    registry
        .impose(&entity, Some(minutes(10)), Some("griefing".into()), true, t0)
        .unwrap();
    assert_eq!(host.captures(), 1);

    // 3 minutes served, then the entity disconnects
    let t1 = t0 + minutes(3);
    registry.on_presence_changed(&entity, false, t1).unwrap();

    // Half an hour offline: the clock is frozen at 7 minutes
    let t2 = t1 + minutes(30);
    assert_eq!(registry.query(&entity, t2).unwrap().remaining, minutes(7));

    // Reconnect; the remaining 7 minutes resume
    registry.on_presence_changed(&entity, true, t2).unwrap();
    assert_eq!(registry.next_release_at(), Some(t2 + minutes(7)));

    // Expiry fires once and restores the checkpoint
    let t3 = t2 + minutes(7) + Duration::from_secs(1);
    let events = registry.tick(t3);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        RegistryEvent::Released {
            cause: ReleaseCause::Expired,
            checkpoint_restored: true,
            ..
        }
    ));
    assert!(registry.query(&entity, t3).is_none());
    assert_eq!(host.restored().len(), 1);
    assert!(registry.tick(t3 + minutes(1)).is_empty());

    // The audit log tells the whole story
    let audits = store.recent_audits(10).unwrap();
    let kinds: Vec<&'static str> = audits
        .iter()
        .rev()
        .map(|audit| match audit.event {
            AuditEventType::RestrictionImposed { .. } => "imposed",
            AuditEventType::RestrictionSuspended { .. } => "suspended",
            AuditEventType::RestrictionResumed { .. } => "resumed",
            AuditEventType::RestrictionReleased { .. } => "released",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["imposed", "suspended", "resumed", "released"]);
}

#[test]
fn restart_recovery_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wardend.db");
    let entity = EntityId::new("entity-1");
    let t0 = MonotonicInstant::now();

    // First daemon run: impose 15 minutes, serve 5, then crash. The last
    // write-through snapshot is all that survives.
    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let host = Arc::new(MockHost::new());
        host.connect(&entity);

        let mut registry =
            RestrictionRegistry::new(store.clone(), host.clone(), DEFAULT_DURATION);
        registry
            .impose(&entity, Some(minutes(15)), None, true, t0)
            .unwrap();
        registry.write_snapshot(t0 + minutes(5));
    }

    // Second run, minutes later on a fresh clock: hydrate, then promote
    // entities the host reports present.
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let host = Arc::new(MockHost::new());
    host.set_present_silently(&entity);

    let mut registry = RestrictionRegistry::new(store.clone(), host.clone(), DEFAULT_DURATION);
    registry.hydrate(store.load_restrictions().unwrap());

    let t1 = t0 + minutes(45);
    let events = registry.reconcile(host.as_ref(), t1);
    assert_eq!(events.len(), 1);

    // Downtime did not count: 10 minutes remain
    let view = registry.query(&entity, t1).unwrap();
    assert!(view.present);
    assert_eq!(view.remaining, minutes(10));

    // And the restriction still expires on its own
    let events = registry.tick(t1 + minutes(10) + Duration::from_secs(1));
    assert_eq!(events.len(), 1);
    assert!(store.load_restrictions().unwrap().is_empty());
}

#[test]
fn offline_impose_waits_for_the_entity() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let host = Arc::new(MockHost::new());
    let mut registry = RestrictionRegistry::new(store.clone(), host.clone(), DEFAULT_DURATION);

    let entity = EntityId::new("entity-1");
    let t0 = MonotonicInstant::now();

    // Impose on an entity that is not connected
    registry
        .impose(&entity, Some(minutes(10)), None, false, t0)
        .unwrap();
    assert_eq!(host.captures(), 0);

    // Hours pass; nothing expires while absent
    let t1 = t0 + minutes(180);
    assert!(registry.tick(t1).is_empty());
    assert_eq!(registry.query(&entity, t1).unwrap().remaining, minutes(10));

    // The entity finally connects: checkpoint captured, clock starts
    host.connect(&entity);
    registry.on_presence_changed(&entity, true, t1).unwrap();
    assert_eq!(host.captures(), 1);

    // An admin releases early; the entity goes back where it connected
    registry.release(&entity, t1 + minutes(2)).unwrap();
    assert_eq!(host.restored().len(), 1);
    assert!(store.load_restrictions().unwrap().is_empty());
}

#[test]
fn manual_overrides_race_the_auto_release_safely() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let host = Arc::new(MockHost::new());
    let mut registry = RestrictionRegistry::new(store.clone(), host.clone(), DEFAULT_DURATION);

    let entity = EntityId::new("entity-1");
    host.connect(&entity);
    let t0 = MonotonicInstant::now();

    registry
        .impose(&entity, Some(minutes(10)), None, true, t0)
        .unwrap();

    // Extension supersedes the armed release
    registry
        .extend(&entity, chrono::Duration::minutes(5), t0)
        .unwrap();

    // The superseded release firing at its original schedule is a no-op
    assert!(registry.on_release_due(&entity, 0, t0 + minutes(10)).is_none());
    assert_eq!(
        registry.query(&entity, t0 + minutes(10)).unwrap().remaining,
        minutes(5)
    );

    // Manual release wins over the still-pending extended release
    registry.release(&entity, t0 + minutes(11)).unwrap();
    assert_eq!(host.restored().len(), 1);

    // The extended release coming due afterwards finds nothing to do
    assert!(registry.tick(t0 + minutes(16)).is_empty());
    assert_eq!(host.restored().len(), 1);

    // A second manual release reports the entity as unrestricted
    assert!(registry.release(&entity, t0 + minutes(12)).is_err());
}

#[test]
fn shutdown_suspends_and_persists_relative_time() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wardend.db");
    let entity = EntityId::new("entity-1");
    let t0 = MonotonicInstant::now();

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let host = Arc::new(MockHost::new());
        host.connect(&entity);

        let mut registry =
            RestrictionRegistry::new(store.clone(), host.clone(), DEFAULT_DURATION);
        registry
            .impose(&entity, Some(minutes(10)), None, true, t0)
            .unwrap();

        // Graceful shutdown at the 4-minute mark
        let t1 = t0 + minutes(4);
        let suspended = registry.suspend_all(t1);
        assert_eq!(suspended.len(), 1);
        registry.write_snapshot(t1);
    }

    let store = SqliteStore::open(&db_path).unwrap();
    let rows = store.load_restrictions().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].remaining, minutes(6));
    assert!(rows[0].checkpoint.is_some());
}

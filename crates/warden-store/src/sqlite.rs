//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreResult, StoredRestriction};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing and degraded startup)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Active restrictions (full-table replaced on every write)
            CREATE TABLE IF NOT EXISTS restrictions (
                entity_id TEXT PRIMARY KEY,
                reason TEXT NOT NULL,
                remaining_secs INTEGER NOT NULL,
                checkpoint_json TEXT,
                imposed_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn load_restrictions(&self) -> StoreResult<Vec<StoredRestriction>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT entity_id, reason, remaining_secs, checkpoint_json, imposed_at
             FROM restrictions ORDER BY entity_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let entity_id: String = row.get(0)?;
            let reason: String = row.get(1)?;
            let remaining_secs: i64 = row.get(2)?;
            let checkpoint_json: Option<String> = row.get(3)?;
            let imposed_at: String = row.get(4)?;
            Ok((entity_id, reason, remaining_secs, checkpoint_json, imposed_at))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (entity_id, reason, remaining_secs, checkpoint_json, imposed_at) = row?;

            let checkpoint = match checkpoint_json {
                Some(json) => Some(serde_json::from_str(&json)?),
                None => None,
            };
            let imposed_at = DateTime::parse_from_rfc3339(&imposed_at)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| Local::now());

            records.push(StoredRestriction {
                entity_id: entity_id.into(),
                reason,
                remaining: Duration::from_secs(remaining_secs.max(0) as u64),
                checkpoint,
                imposed_at,
            });
        }

        Ok(records)
    }

    fn replace_restrictions(&self, records: &[StoredRestriction]) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM restrictions", [])?;
        for record in records {
            let checkpoint_json = record
                .checkpoint
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            tx.execute(
                r#"
                INSERT INTO restrictions (entity_id, reason, remaining_secs, checkpoint_json, imposed_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    record.entity_id.as_str(),
                    record.reason,
                    record.remaining.as_secs() as i64,
                    checkpoint_json,
                    record.imposed_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        debug!(count = records.len(), "Restriction snapshot written");
        Ok(())
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| Local::now());
            let event = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).optional().is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use warden_api::{Checkpoint, CheckpointPayload, ReleaseCause};
    use warden_util::EntityId;

    fn stored(entity: &str, remaining_secs: u64) -> StoredRestriction {
        StoredRestriction {
            entity_id: EntityId::new(entity),
            reason: "No reason provided".into(),
            remaining: Duration::from_secs(remaining_secs),
            checkpoint: Some(Checkpoint::new(CheckpointPayload::Position {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            })),
            imposed_at: Local::now(),
        }
    }

    #[test]
    fn in_memory_store_is_healthy() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn restriction_snapshot_round_trip() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store.load_restrictions().unwrap().is_empty());

        store
            .replace_restrictions(&[stored("a", 600), stored("b", 30)])
            .unwrap();

        let loaded = store.load_restrictions().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].entity_id.as_str(), "a");
        assert_eq!(loaded[0].remaining, Duration::from_secs(600));
        assert!(loaded[0].checkpoint.is_some());
    }

    #[test]
    fn replace_is_a_full_table_swap() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .replace_restrictions(&[stored("a", 600), stored("b", 30)])
            .unwrap();
        store.replace_restrictions(&[stored("c", 10)]).unwrap();

        let loaded = store.load_restrictions().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].entity_id.as_str(), "c");
    }

    #[test]
    fn replace_with_empty_clears_table() {
        let store = SqliteStore::in_memory().unwrap();

        store.replace_restrictions(&[stored("a", 600)]).unwrap();
        store.replace_restrictions(&[]).unwrap();

        assert!(store.load_restrictions().unwrap().is_empty());
    }

    #[test]
    fn audit_log_appends_and_reads_back() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::RestrictionReleased {
                entity_id: EntityId::new("a"),
                cause: ReleaseCause::Expired,
            }))
            .unwrap();

        let events = store.recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        // Newest first
        assert!(matches!(
            events[0].event,
            AuditEventType::RestrictionReleased { .. }
        ));
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.replace_restrictions(&[stored("a", 600)]).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.load_restrictions().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].entity_id.as_str(), "a");
    }
}

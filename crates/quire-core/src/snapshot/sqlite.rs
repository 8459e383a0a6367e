//! `SQLite` snapshot store

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::SnapshotStore;
use crate::models::{LocalSnapshotRecord, StorageKey};
use crate::Result;

/// Embedded store keeping one row per storage key.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_raw(&self, key: &StorageKey) -> Result<Option<String>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT record FROM draft_snapshots WHERE storage_key = ?",
                params![key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(raw)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn read(&self, key: &StorageKey) -> Option<LocalSnapshotRecord> {
        match self.read_raw(key) {
            Ok(raw) => LocalSnapshotRecord::decode(&raw?),
            Err(error) => {
                tracing::warn!("Failed to read snapshot for {}: {}", key, error);
                None
            }
        }
    }

    fn write(&self, key: &StorageKey, record: &LocalSnapshotRecord) -> Result<()> {
        let encoded = record.encode()?;
        let now = chrono::Utc::now().timestamp_millis();
        self.conn().execute(
            "INSERT INTO draft_snapshots (storage_key, record, written_at) VALUES (?, ?, ?)
             ON CONFLICT(storage_key) DO UPDATE SET record = excluded.record, written_at = excluded.written_at",
            params![key.as_str(), encoded, now],
        )?;
        Ok(())
    }

    fn clear(&self, key: &StorageKey) -> Result<()> {
        self.conn().execute(
            "DELETE FROM draft_snapshots WHERE storage_key = ?",
            params![key.as_str()],
        )?;
        Ok(())
    }
}

/// Run all pending migrations
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
    )?;
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Migration to version 1: snapshot table
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS draft_snapshots (
             storage_key TEXT PRIMARY KEY,
             record TEXT NOT NULL,
             written_at INTEGER NOT NULL
         );
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DraftId;
    use pretty_assertions::assert_eq;

    #[test]
    fn sqlite_store_upserts_records() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let key = StorageKey::for_draft("general", None);

        let first = LocalSnapshotRecord {
            draft_id: Some(DraftId::from("draft-1")),
            snapshot: "{}".to_string(),
            ..LocalSnapshotRecord::default()
        };
        store.write(&key, &first).unwrap();

        let second = LocalSnapshotRecord {
            updated_at: Some("2026-02-01T00:00:00Z".to_string()),
            ..first
        };
        store.write(&key, &second).unwrap();
        assert_eq!(store.read(&key), Some(second));

        store.clear(&key).unwrap();
        assert_eq!(store.read(&key), None);
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshots.db");
        let key = StorageKey::for_draft("general", Some("42"));
        let record = LocalSnapshotRecord {
            draft_id: Some(DraftId::from("draft-42")),
            ..LocalSnapshotRecord::default()
        };

        SqliteSnapshotStore::open(&path)
            .unwrap()
            .write(&key, &record)
            .unwrap();
        let reopened = SqliteSnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.read(&key), Some(record));
    }

    #[test]
    fn sqlite_store_treats_corrupt_row_as_absent() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let key = StorageKey::for_draft("general", None);
        store
            .conn()
            .execute(
                "INSERT INTO draft_snapshots (storage_key, record, written_at) VALUES (?, ?, 0)",
                params![key.as_str(), "not json"],
            )
            .unwrap();
        assert_eq!(store.read(&key), None);
    }
}

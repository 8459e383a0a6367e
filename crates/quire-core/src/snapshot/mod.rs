//! Key-value persistence of the last confirmed save.
//!
//! A store holds one [`LocalSnapshotRecord`] per [`StorageKey`]. Reads never
//! fail: missing or corrupt data is reported as absent so an editor can always
//! start. Writes replace the whole record at once.

mod file;
mod sqlite;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::{LocalSnapshotRecord, StorageKey};
use crate::Result;

pub use file::JsonFileSnapshotStore;
pub use sqlite::SqliteSnapshotStore;

/// Trait for snapshot persistence backends
pub trait SnapshotStore: Send + Sync + 'static {
    /// Read the record for a key; corrupt or missing data is `None`.
    fn read(&self, key: &StorageKey) -> Option<LocalSnapshotRecord>;

    /// Atomically replace the record for a key.
    fn write(&self, key: &StorageKey, record: &LocalSnapshotRecord) -> Result<()>;

    /// Remove the record for a key. Removing an absent key is not an error.
    fn clear(&self, key: &StorageKey) -> Result<()>;
}

impl<S: SnapshotStore> SnapshotStore for Arc<S> {
    fn read(&self, key: &StorageKey) -> Option<LocalSnapshotRecord> {
        (**self).read(key)
    }

    fn write(&self, key: &StorageKey, record: &LocalSnapshotRecord) -> Result<()> {
        (**self).write(key, record)
    }

    fn clear(&self, key: &StorageKey) -> Result<()> {
        (**self).clear(key)
    }
}

/// In-memory store keeping raw serialized records, like browser local storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value verbatim, bypassing serialization.
    pub fn insert_raw(&self, key: &StorageKey, raw: impl Into<String>) {
        self.lock().insert(key.as_str().to_string(), raw.into());
    }

    /// Raw stored value for a key.
    pub fn raw(&self, key: &StorageKey) -> Option<String> {
        self.lock().get(key.as_str()).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self, key: &StorageKey) -> Option<LocalSnapshotRecord> {
        let raw = self.raw(key)?;
        LocalSnapshotRecord::decode(&raw)
    }

    fn write(&self, key: &StorageKey, record: &LocalSnapshotRecord) -> Result<()> {
        let encoded = record.encode()?;
        self.lock().insert(key.as_str().to_string(), encoded);
        Ok(())
    }

    fn clear(&self, key: &StorageKey) -> Result<()> {
        self.lock().remove(key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DraftId;
    use pretty_assertions::assert_eq;

    fn sample_record() -> LocalSnapshotRecord {
        LocalSnapshotRecord {
            draft_id: Some(DraftId::from("draft-1")),
            updated_at: Some("2026-01-01T10:00:00Z".to_string()),
            snapshot: r#"{"title":"t","content":"c","metadata":{},"post_id":null}"#.to_string(),
            last_saved_at: Some(chrono::Utc::now()),
            server_updated_at: None,
        }
    }

    #[test]
    fn memory_store_roundtrip_and_clear() {
        let store = MemorySnapshotStore::new();
        let key = StorageKey::for_draft("general", None);
        assert_eq!(store.read(&key), None);

        let record = sample_record();
        store.write(&key, &record).unwrap();
        assert_eq!(store.read(&key), Some(record));

        store.clear(&key).unwrap();
        assert_eq!(store.read(&key), None);
        store.clear(&key).unwrap();
    }

    #[test]
    fn memory_store_tolerates_corrupt_data() {
        let store = MemorySnapshotStore::new();
        let key = StorageKey::for_draft("general", None);
        store.insert_raw(&key, "{{{{");
        assert_eq!(store.read(&key), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_store_write_replaces_whole_record() {
        let store = MemorySnapshotStore::new();
        let key = StorageKey::for_draft("general", Some("9"));
        store.write(&key, &sample_record()).unwrap();

        let replacement = LocalSnapshotRecord {
            draft_id: Some(DraftId::from("draft-1")),
            ..LocalSnapshotRecord::default()
        };
        store.write(&key, &replacement).unwrap();
        assert_eq!(store.read(&key), Some(replacement));
    }
}

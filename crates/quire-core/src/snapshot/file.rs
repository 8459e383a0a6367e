//! File-backed snapshot store: one JSON file per storage key.

use std::fs;
use std::path::{Path, PathBuf};

use super::SnapshotStore;
use crate::models::{LocalSnapshotRecord, StorageKey};
use crate::Result;

const FILE_EXTENSION: &str = "json";

/// Stores each record as `<dir>/<url-encoded key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    dir: PathBuf,
}

impl JsonFileSnapshotStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &StorageKey) -> PathBuf {
        let file_name = format!("{}.{FILE_EXTENSION}", urlencoding::encode(key.as_str()));
        self.dir.join(file_name)
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn read(&self, key: &StorageKey) -> Option<LocalSnapshotRecord> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => LocalSnapshotRecord::decode(&raw),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => {
                tracing::warn!("Failed to read snapshot {}: {}", path.display(), error);
                None
            }
        }
    }

    fn write(&self, key: &StorageKey, record: &LocalSnapshotRecord) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, record.encode()?)?;
        // Rename is atomic on the same filesystem; readers see old or new, never half.
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn clear(&self, key: &StorageKey) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DraftId;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_store_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = StorageKey::for_draft("general", None);
        let record = LocalSnapshotRecord {
            draft_id: Some(DraftId::from("draft-7")),
            snapshot: "{}".to_string(),
            ..LocalSnapshotRecord::default()
        };

        JsonFileSnapshotStore::open(dir.path())
            .unwrap()
            .write(&key, &record)
            .unwrap();

        let reopened = JsonFileSnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.read(&key), Some(record));
        assert!(!reopened.path_for(&key).with_extension("json.tmp").exists());
    }

    #[test]
    fn file_store_keys_do_not_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::open(dir.path()).unwrap();
        let key = StorageKey::custom("../../etc/passwd");
        assert_eq!(store.path_for(&key).parent(), Some(dir.path()));
    }

    #[test]
    fn file_store_treats_corrupt_file_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::open(dir.path()).unwrap();
        let key = StorageKey::for_draft("general", None);
        fs::write(store.path_for(&key), "garbage").unwrap();

        assert_eq!(store.read(&key), None);
        store.clear(&key).unwrap();
        store.clear(&key).unwrap();
    }
}

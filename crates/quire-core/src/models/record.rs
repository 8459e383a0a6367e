//! Locally persisted snapshot of the last confirmed save

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DraftId, DraftPayload};

const KEY_PREFIX: &str = "draft";
const NEW_POST_SEGMENT: &str = "new";

/// Storage key for one editing session: `draft:<postId|new>:<boardId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derive the key from the board and the optional published post.
    #[must_use]
    pub fn for_draft(board_id: &str, post_id: Option<&str>) -> Self {
        let post_segment = post_id
            .map(str::trim)
            .filter(|post_id| !post_id.is_empty())
            .unwrap_or(NEW_POST_SEGMENT);
        Self(format!("{KEY_PREFIX}:{post_segment}:{}", board_id.trim()))
    }

    /// Use a caller-chosen key verbatim.
    #[must_use]
    pub fn custom(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the client last confirmed with the server for one storage key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSnapshotRecord {
    /// Absent until the server acknowledged the first create.
    #[serde(default)]
    pub draft_id: Option<DraftId>,
    /// Last known server concurrency token.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Serialized payload at the last successful save.
    #[serde(default)]
    pub snapshot: String,
    #[serde(default)]
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Newer server token seen in an unresolved conflict. `updated_at` keeps
    /// the token the snapshot was saved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_updated_at: Option<String>,
}

impl LocalSnapshotRecord {
    /// Decode a stored record; anything unreadable counts as absent.
    pub fn decode(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(raw) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!("Ignoring corrupt snapshot record: {}", error);
                None
            }
        }
    }

    pub fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Payload captured at the last successful save.
    #[must_use]
    pub fn payload(&self) -> Option<DraftPayload> {
        DraftPayload::from_snapshot(&self.snapshot)
    }
}

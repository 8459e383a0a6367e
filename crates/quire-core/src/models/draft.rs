//! Draft model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Server-assigned draft identifier.
///
/// Opaque to the client: it is only echoed back in request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DraftId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Draft ID cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for DraftId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status of a server-side draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    #[default]
    Active,
    Conflict,
    Expired,
    Archived,
    #[serde(other)]
    Unknown,
}

/// Authoritative server record of in-progress content.
///
/// `updated_at` is the optimistic-concurrency token and is kept verbatim as
/// the server formatted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub status: DraftStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Set by the server when a write succeeded but diverged from another writer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub conflict_warning: bool,
}

impl Draft {
    /// Concurrency token to send with the next update.
    #[must_use]
    pub fn version_token(&self) -> Option<&str> {
        self.updated_at.as_deref().or(self.created_at.as_deref())
    }

    /// Payload view of this draft, as it would be sent back to the server.
    #[must_use]
    pub fn payload(&self) -> DraftPayload {
        DraftPayload {
            title: self.title.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
            post_id: self.post_id.clone(),
        }
    }
}

/// Body of create/update requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub post_id: Option<String>,
}

impl DraftPayload {
    /// Create a payload with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Whether there is anything worth creating a server draft for.
    ///
    /// Whitespace-only title and content count as empty.
    #[must_use]
    pub fn has_substantive_content(&self) -> bool {
        !self.title.trim().is_empty() || !self.content.trim().is_empty()
    }

    /// Canonical serialized form stored as the local snapshot.
    #[must_use]
    pub fn snapshot(&self) -> String {
        // Only string/map fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a stored snapshot back into a payload.
    pub fn from_snapshot(snapshot: &str) -> Option<Self> {
        if snapshot.trim().is_empty() {
            return None;
        }
        serde_json::from_str(snapshot).ok()
    }
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

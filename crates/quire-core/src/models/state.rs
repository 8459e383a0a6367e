//! In-memory save state published to the editor UI

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Draft, DraftId};

/// Where the engine is in the save cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Idle,
    /// Fetching the server copy of a stored draft before saves are allowed.
    Loading,
    Dirty,
    Saving,
    Saved,
    Conflict,
    Error,
}

impl SaveStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Dirty => "dirty",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed error taxonomy surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveErrorKind {
    Conflict,
    RateLimited,
    NetworkError,
    ValidationError,
    LoadFailed,
}

impl SaveErrorKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
            Self::ValidationError => "validation_error",
            Self::LoadFailed => "load_failed",
        }
    }
}

impl fmt::Display for SaveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What started a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOrigin {
    Manual,
    Debounce,
    Interval,
    Resolution,
}

impl SaveOrigin {
    /// Automatic saves are skipped when nothing changed since the snapshot.
    #[must_use]
    pub const fn is_automatic(self) -> bool {
        matches!(self, Self::Debounce | Self::Interval)
    }
}

/// Snapshot of the engine state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveState {
    pub status: SaveStatus,
    pub error: Option<SaveErrorKind>,
    pub conflict_draft: Option<Draft>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub draft_id: Option<DraftId>,
}

impl SaveState {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.status, SaveStatus::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_wire_names() {
        assert_eq!(SaveStatus::Conflict.to_string(), "conflict");
        assert_eq!(SaveErrorKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            serde_json::to_value(SaveErrorKind::ValidationError).unwrap(),
            "validation_error"
        );
        assert_eq!(serde_json::to_value(SaveStatus::Saving).unwrap(), "saving");
    }

    #[test]
    fn only_timer_origins_are_automatic() {
        assert!(SaveOrigin::Debounce.is_automatic());
        assert!(SaveOrigin::Interval.is_automatic());
        assert!(!SaveOrigin::Manual.is_automatic());
        assert!(!SaveOrigin::Resolution.is_automatic());
    }
}

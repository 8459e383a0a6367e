//! Explicit exits from the `conflict` state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::coordinator::SaveCoordinator;
use crate::error::Error;
use crate::form::FormAdapter;
use crate::metrics::{MetricName, MetricReason, MetricsEmitter};
use crate::models::{Draft, SaveOrigin, SaveStatus};
use crate::snapshot::SnapshotStore;
use crate::transport::DraftTransport;

/// How to settle a divergence between the local form and the server draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Overwrite the server copy with the current form content.
    KeepLocal,
    /// Replace the form content with the server copy.
    DiscardLocal,
}

impl ConflictResolution {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::DiscardLocal => "discard_local",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ConflictResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_local" => Ok(Self::KeepLocal),
            "discard_local" => Ok(Self::DiscardLocal),
            other => Err(Error::InvalidInput(format!(
                "Unknown conflict resolution '{other}'"
            ))),
        }
    }
}

impl<F, T, S, M> SaveCoordinator<F, T, S, M>
where
    F: FormAdapter,
    T: DraftTransport,
    S: SnapshotStore,
    M: MetricsEmitter,
{
    pub(super) async fn resolve_conflict(self: &Arc<Self>, resolution: ConflictResolution) -> bool {
        if !self.is_active() {
            return false;
        }
        let state = self.state();
        if !state.is_conflict() {
            tracing::debug!("No conflict to resolve for {}", self.storage_key());
            return false;
        }

        let resolved = match resolution {
            ConflictResolution::KeepLocal => self.keep_local(state.conflict_draft).await,
            ConflictResolution::DiscardLocal => self.discard_local(state.conflict_draft).await,
        };
        if resolved {
            tracing::info!("Resolved conflict on {} with {}", self.storage_key(), resolution);
            self.emit(
                MetricName::ConflictResolved,
                SaveOrigin::Resolution,
                Some(match resolution {
                    ConflictResolution::KeepLocal => MetricReason::KeepLocal,
                    ConflictResolution::DiscardLocal => MetricReason::DiscardLocal,
                }),
                None,
                None,
            );
        }
        resolved
    }

    /// Adopt the server's token so the overwrite is accepted, then send the
    /// current form content once.
    async fn keep_local(self: &Arc<Self>, conflict_draft: Option<Draft>) -> bool {
        if let Some(token) = conflict_draft.as_ref().and_then(Draft::version_token) {
            self.session().version_token = Some(token.to_string());
        }

        let state = self.run_save(SaveOrigin::Resolution).await;
        matches!(state.status, SaveStatus::Saved | SaveStatus::Dirty) && state.error.is_none()
    }

    async fn discard_local(&self, conflict_draft: Option<Draft>) -> bool {
        let draft = match conflict_draft {
            Some(draft) => Some(draft),
            None => self.fetch_current().await,
        };
        if self.is_disposed() {
            return false;
        }
        self.scheduler.cancel();

        if let Some(draft) = &draft {
            self.adopt_server_draft(draft);
        } else {
            tracing::warn!(
                "No server copy available for {}; clearing the conflict",
                self.storage_key()
            );
        }
        self.update_state(|state| {
            state.status = SaveStatus::Saved;
            state.error = None;
            state.conflict_draft = None;
        });
        true
    }

    async fn fetch_current(&self) -> Option<Draft> {
        let draft_id = self.session().draft_id.clone()?;
        match self.transport.fetch(&draft_id).await {
            Ok(draft) => Some(draft),
            Err(error) => {
                tracing::warn!("Failed to load server draft {}: {}", draft_id, error);
                None
            }
        }
    }
}

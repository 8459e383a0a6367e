//! Draft autosave engine.
//!
//! [`DraftAutosave`] ties a form, a transport, a snapshot store and a metrics
//! sink together. Edits are debounced into single-flight saves, optimistic
//! concurrency conflicts are surfaced for explicit resolution, and the last
//! confirmed save is persisted locally so an editor can resume after reload.
//!
//! ```ignore
//! let autosave = DraftAutosave::new(
//!     AutosaveOptions::new("general"),
//!     &config,
//!     MappedForm::for_payload(DraftPayload::default()),
//!     HttpDraftTransport::new(&config)?,
//!     MemorySnapshotStore::new(),
//!     TracingMetrics,
//! );
//! autosave.start().await;
//! autosave.notify_change();
//! ```

mod conflict;
mod coordinator;


use std::sync::Arc;

use tokio::sync::watch;

use crate::config::AutosaveConfig;
use crate::form::FormAdapter;
use crate::metrics::MetricsEmitter;
use crate::models::{SaveState, StorageKey};
use crate::snapshot::SnapshotStore;
use crate::transport::DraftTransport;

pub use conflict::ConflictResolution;
use coordinator::SaveCoordinator;

/// Identity of one editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveOptions {
    pub board_id: String,
    /// Published post being edited; `None` for a new post.
    pub post_id: Option<String>,
    /// Overrides the derived `draft:<post|new>:<board>` key.
    pub storage_key: Option<StorageKey>,
    /// When false every operation is a no-op.
    pub enabled: bool,
}

impl AutosaveOptions {
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            post_id: None,
            storage_key: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_post_id(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: StorageKey) -> Self {
        self.storage_key = Some(key);
        self
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn storage_key(&self) -> StorageKey {
        self.storage_key
            .clone()
            .unwrap_or_else(|| StorageKey::for_draft(&self.board_id, self.post_id.as_deref()))
    }
}

/// Handle to an autosave session. Cheap to clone; all clones drive the same engine.
pub struct DraftAutosave<F, T, S, M> {
    inner: Arc<SaveCoordinator<F, T, S, M>>,
}

impl<F, T, S, M> Clone for DraftAutosave<F, T, S, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, T, S, M> DraftAutosave<F, T, S, M>
where
    F: FormAdapter,
    T: DraftTransport,
    S: SnapshotStore,
    M: MetricsEmitter,
{
    /// Build the engine and load the stored record for the session key.
    ///
    /// A stored draft id puts the engine in `loading` until [`Self::hydrate`]
    /// (or [`Self::start`]) has fetched the server copy.
    pub fn new(
        options: AutosaveOptions,
        config: &AutosaveConfig,
        form: F,
        transport: T,
        store: S,
        metrics: M,
    ) -> Self {
        Self {
            inner: Arc::new(SaveCoordinator::new(
                options, config, form, transport, store, metrics,
            )),
        }
    }

    pub fn storage_key(&self) -> &StorageKey {
        self.inner.storage_key()
    }

    pub fn form(&self) -> &F {
        self.inner.form()
    }

    pub fn state(&self) -> SaveState {
        self.inner.state()
    }

    /// Receive every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.inner.subscribe()
    }

    /// Hydrate, then start the periodic autosave ticker when configured.
    pub async fn start(&self) -> SaveState {
        let state = self.inner.hydrate().await;
        self.inner.start_ticker();
        state
    }

    /// Fetch the server copy of a stored draft. No-op without one.
    ///
    /// Unsaved form content is never replaced: it becomes a conflict when the
    /// server copy moved on, and is scheduled for saving when it did not.
    pub async fn hydrate(&self) -> SaveState {
        self.inner.hydrate().await
    }

    /// Tell the engine the form changed; arms the debounce timer when dirty.
    pub fn notify_change(&self) {
        self.inner.notify_change();
    }

    /// Save now, cancelling any pending timer. No-op while a save is in flight.
    pub async fn trigger_save(&self) -> SaveState {
        self.inner.trigger_save().await
    }

    /// Leave the `conflict` state. Returns whether the conflict was resolved.
    pub async fn resolve_conflict(&self, resolution: ConflictResolution) -> bool {
        self.inner.resolve_conflict(resolution).await
    }

    /// Delete the server draft and forget the local record.
    pub async fn clear_draft(&self) -> SaveState {
        self.inner.clear_draft().await
    }

    /// Stop timers and ignore any response still in flight.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

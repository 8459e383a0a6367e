//! Save state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::AutosaveOptions;
use crate::config::AutosaveConfig;
use crate::form::FormAdapter;
use crate::metrics::{DraftMetricEvent, MetricName, MetricReason, MetricsEmitter};
use crate::models::{
    Draft, DraftId, DraftPayload, LocalSnapshotRecord, SaveErrorKind, SaveOrigin, SaveState,
    SaveStatus, StorageKey,
};
use crate::scheduler::DebounceScheduler;
use crate::snapshot::SnapshotStore;
use crate::transport::{DraftTransport, TransportError};
use crate::util::advance_timestamp;

/// What the engine last confirmed with the server.
#[derive(Debug, Default)]
pub(super) struct Session {
    pub(super) draft_id: Option<DraftId>,
    pub(super) version_token: Option<String>,
    pub(super) snapshot: String,
    pub(super) hydrated: bool,
    /// Bumped when the session is reset; responses from an older epoch are dropped.
    pub(super) epoch: u64,
}

impl Session {
    fn last_saved_payload(&self) -> Option<DraftPayload> {
        DraftPayload::from_snapshot(&self.snapshot)
    }
}

/// Automatic saves stay off after a 429 until an explicit save, or until
/// `until` when the server sent `Retry-After`.
#[derive(Debug, Clone, Copy)]
struct RateLimit {
    until: Option<Instant>,
}

/// Clears the in-flight flag when the save finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(super) struct SaveCoordinator<F, T, S, M> {
    pub(super) options: AutosaveOptions,
    storage_key: StorageKey,
    interval: Option<Duration>,
    pub(super) form: F,
    pub(super) transport: T,
    store: S,
    metrics: M,
    session: Mutex<Session>,
    state: watch::Sender<SaveState>,
    in_flight: AtomicBool,
    disposed: AtomicBool,
    rate_limit: Mutex<Option<RateLimit>>,
    pub(super) scheduler: DebounceScheduler,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<F, T, S, M> SaveCoordinator<F, T, S, M>
where
    F: FormAdapter,
    T: DraftTransport,
    S: SnapshotStore,
    M: MetricsEmitter,
{
    pub(super) fn new(
        options: AutosaveOptions,
        config: &AutosaveConfig,
        form: F,
        transport: T,
        store: S,
        metrics: M,
    ) -> Self {
        let storage_key = options.storage_key();
        let record = store.read(&storage_key).unwrap_or_default();
        let needs_hydration = options.enabled && record.draft_id.is_some();

        let initial = SaveState {
            status: if needs_hydration {
                SaveStatus::Loading
            } else {
                SaveStatus::Idle
            },
            last_saved_at: record.last_saved_at,
            draft_id: record.draft_id.clone(),
            ..SaveState::default()
        };
        let session = Session {
            draft_id: record.draft_id,
            version_token: record.updated_at,
            snapshot: record.snapshot,
            hydrated: !needs_hydration,
            epoch: 0,
        };
        let (state, _) = watch::channel(initial);

        Self {
            options,
            storage_key,
            interval: config.interval,
            form,
            transport,
            store,
            metrics,
            session: Mutex::new(session),
            state,
            in_flight: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            rate_limit: Mutex::new(None),
            scheduler: DebounceScheduler::new(config.debounce),
            ticker: Mutex::new(None),
        }
    }

    pub(super) const fn storage_key(&self) -> &StorageKey {
        &self.storage_key
    }

    pub(super) const fn form(&self) -> &F {
        &self.form
    }

    pub(super) fn state(&self) -> SaveState {
        self.state.borrow().clone()
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.state.subscribe()
    }

    pub(super) fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn update_state(&self, update: impl FnOnce(&mut SaveState)) {
        self.state.send_modify(update);
    }

    pub(super) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(super) fn is_active(&self) -> bool {
        self.options.enabled && !self.is_disposed()
    }

    pub(super) fn last_saved_payload(&self) -> Option<DraftPayload> {
        self.session().last_saved_payload()
    }

    pub(super) fn notify_change(self: &Arc<Self>) {
        if !self.is_active() || !self.session().hydrated {
            return;
        }

        let state = self.state();
        if state.is_conflict() {
            tracing::debug!("Edit held until the conflict on {} is resolved", self.storage_key);
            return;
        }

        let values = self.form.current_values();
        let last_saved = self.last_saved_payload();
        if self.form.is_dirty(&values, last_saved.as_ref()) {
            if state.status != SaveStatus::Saving && state.status != SaveStatus::Dirty {
                self.update_state(|state| state.status = SaveStatus::Dirty);
            }
            if self.automatic_saves_allowed() {
                self.schedule_save();
            } else {
                tracing::debug!("Rate limited; edit on {} waits for an explicit save", self.storage_key);
            }
        } else if state.status == SaveStatus::Dirty {
            // Edited back to the saved content.
            self.scheduler.cancel();
            let settled = if state.draft_id.is_some() {
                SaveStatus::Saved
            } else {
                SaveStatus::Idle
            };
            self.update_state(|state| state.status = settled);
        }
    }

    pub(super) async fn trigger_save(self: &Arc<Self>) -> SaveState {
        self.run_save(SaveOrigin::Manual).await
    }

    pub(super) fn schedule_save(self: &Arc<Self>) {
        let coordinator = Arc::downgrade(self);
        let armed = self.scheduler.arm(move || async move {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.run_save(SaveOrigin::Debounce).await;
            }
        });
        if !armed {
            tracing::debug!("Scheduler disposed; not arming save for {}", self.storage_key);
        }
    }

    pub(super) fn start_ticker(self: &Arc<Self>) {
        let Some(period) = self.interval else {
            return;
        };
        if !self.is_active() {
            return;
        }

        let coordinator = Arc::downgrade(self);
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                if coordinator.is_disposed() {
                    break;
                }
                coordinator.run_save(SaveOrigin::Interval).await;
            }
        });

        if let Some(previous) = self.ticker().replace(ticker) {
            previous.abort();
        }
    }

    fn ticker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rate_limit(&self) -> MutexGuard<'_, Option<RateLimit>> {
        self.rate_limit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn automatic_saves_allowed(&self) -> bool {
        let mut rate_limit = self.rate_limit();
        match *rate_limit {
            None => true,
            Some(RateLimit { until: Some(until) }) if Instant::now() >= until => {
                *rate_limit = None;
                true
            }
            Some(_) => false,
        }
    }

    /// One save attempt. Returns the state after the attempt, or the
    /// unchanged state when the attempt was skipped.
    pub(super) async fn run_save(self: &Arc<Self>, origin: SaveOrigin) -> SaveState {
        if !self.is_active() {
            return self.state();
        }
        if !self.session().hydrated {
            tracing::debug!("Skipping {:?} save before hydration", origin);
            return self.state();
        }
        if self.state().is_conflict() && origin != SaveOrigin::Resolution {
            tracing::debug!("Skipping {:?} save while in conflict", origin);
            return self.state();
        }
        if origin.is_automatic() && !self.automatic_saves_allowed() {
            tracing::debug!("Skipping {:?} save while rate limited", origin);
            return self.state();
        }

        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("Save already in flight for {}", self.storage_key);
            return self.state();
        };

        if origin == SaveOrigin::Manual || origin == SaveOrigin::Resolution {
            self.scheduler.cancel();
            *self.rate_limit() = None;
        }

        let values = self.form.current_values();
        let payload = self.form.to_payload(&values);
        let (draft_id, version_token, last_saved, epoch) = {
            let session = self.session();
            (
                session.draft_id.clone(),
                session.version_token.clone(),
                session.last_saved_payload(),
                session.epoch,
            )
        };

        if draft_id.is_none() && !payload.has_substantive_content() {
            tracing::debug!("Nothing to save for {}", self.storage_key);
            return self.state();
        }
        if origin.is_automatic() && !self.form.is_dirty(&values, last_saved.as_ref()) {
            tracing::debug!("Content unchanged since last save for {}", self.storage_key);
            return self.state();
        }
        drop(values);

        self.update_state(|state| {
            state.status = SaveStatus::Saving;
            state.error = None;
        });

        let result = match &draft_id {
            None => self.transport.create(&payload).await,
            Some(id) => {
                self.transport
                    .update(id, &payload, version_token.as_deref())
                    .await
            }
        };

        if self.is_disposed() {
            tracing::debug!("Ignoring save response for disposed engine");
            return self.state();
        }
        if self.session().epoch != epoch {
            tracing::debug!("Ignoring save response for a cleared session");
            return self.state();
        }

        match result {
            Ok(draft) => self.handle_saved(origin, &payload, draft),
            Err(error) => self.handle_failed(origin, draft_id.is_some(), &error),
        }
        self.state()
    }

    fn handle_saved(self: &Arc<Self>, origin: SaveOrigin, payload: &DraftPayload, draft: Draft) {
        let snapshot = payload.snapshot();
        let token = draft.version_token().map(str::to_string);
        let previous = self.state().last_saved_at;
        let saved_at = advance_timestamp(previous);

        let draft_id = {
            let mut session = self.session();
            if session.draft_id.is_none() {
                tracing::info!("Created draft {} for {}", draft.id, self.storage_key);
                session.draft_id = Some(draft.id.clone());
            }
            session.version_token.clone_from(&token);
            session.snapshot.clone_from(&snapshot);
            session.draft_id.clone()
        };

        self.persist(&LocalSnapshotRecord {
            draft_id: draft_id.clone(),
            updated_at: token,
            snapshot,
            last_saved_at: Some(saved_at),
            server_updated_at: None,
        });

        if draft.conflict_warning {
            tracing::warn!("Draft {} saved with a conflict warning", draft.id);
            self.update_state(|state| {
                state.status = SaveStatus::Conflict;
                state.error = Some(SaveErrorKind::Conflict);
                state.last_saved_at = Some(saved_at);
                state.draft_id = draft_id;
                state.conflict_draft = Some(draft);
            });
            self.emit(
                MetricName::SaveFailure,
                origin,
                Some(MetricReason::ConflictWarning),
                Some(SaveErrorKind::Conflict),
                None,
            );
            return;
        }

        self.update_state(|state| {
            state.status = SaveStatus::Saved;
            state.error = None;
            state.conflict_draft = None;
            state.last_saved_at = Some(saved_at);
            state.draft_id = draft_id;
        });
        self.emit(MetricName::SaveSuccess, origin, None, None, None);

        // Edits that landed while the request was in flight.
        let values = self.form.current_values();
        let last_saved = self.last_saved_payload();
        if self.form.is_dirty(&values, last_saved.as_ref()) {
            self.update_state(|state| state.status = SaveStatus::Dirty);
            self.schedule_save();
        }
    }

    fn handle_failed(&self, origin: SaveOrigin, had_draft: bool, error: &TransportError) {
        let kind = error.kind();
        match error {
            TransportError::Conflict { draft, message } => {
                tracing::info!("Draft conflict on {}: {}", self.storage_key, message);
                self.record_conflict(draft.as_deref());
                let conflict_draft = draft.as_deref().cloned();
                self.update_state(|state| {
                    state.status = SaveStatus::Conflict;
                    state.error = Some(SaveErrorKind::Conflict);
                    state.conflict_draft = conflict_draft;
                });
                self.emit(
                    MetricName::SaveFailure,
                    origin,
                    Some(MetricReason::HttpConflict),
                    Some(kind),
                    error.http_status(),
                );
                return;
            }
            TransportError::RateLimited { retry_after } => {
                self.scheduler.cancel();
                let until = retry_after.map(|delay| Instant::now() + delay);
                *self.rate_limit() = Some(RateLimit { until });
            }
            _ if error.is_not_found() && had_draft => {
                tracing::warn!(
                    "Draft for {} no longer exists; the next save creates a new one",
                    self.storage_key
                );
                self.forget_draft();
            }
            _ => {}
        }

        tracing::warn!("Draft save failed for {}: {}", self.storage_key, error);
        let draft_id = self.session().draft_id.clone();
        self.update_state(|state| {
            state.status = SaveStatus::Error;
            state.error = Some(kind);
            state.draft_id = draft_id;
        });
        self.emit(
            MetricName::SaveFailure,
            origin,
            Some(failure_reason(kind)),
            Some(kind),
            error.http_status(),
        );
    }

    pub(super) async fn hydrate(self: &Arc<Self>) -> SaveState {
        if !self.is_active() {
            return self.state();
        }
        let (draft_id, epoch) = {
            let session = self.session();
            if session.hydrated {
                return self.state();
            }
            (session.draft_id.clone(), session.epoch)
        };
        let Some(draft_id) = draft_id else {
            self.session().hydrated = true;
            return self.state();
        };

        self.update_state(|state| state.status = SaveStatus::Loading);
        let result = self.transport.fetch(&draft_id).await;
        if self.is_disposed() || self.session().epoch != epoch {
            return self.state();
        }

        match result {
            Ok(draft) => self.apply_hydrated(draft),
            Err(error) if error.is_not_found() => {
                tracing::warn!("Stored draft {} no longer exists on the server", draft_id);
                self.forget_draft();
                self.session().hydrated = true;
                self.update_state(|state| {
                    state.status = SaveStatus::Idle;
                    state.error = Some(SaveErrorKind::LoadFailed);
                    state.conflict_draft = None;
                    state.draft_id = None;
                });
                self.emit_load_failure(&draft_id, &error);
            }
            Err(error) => {
                tracing::warn!("Failed to load draft {}: {}", draft_id, error);
                self.session().hydrated = true;
                self.update_state(|state| {
                    state.status = SaveStatus::Error;
                    state.error = Some(SaveErrorKind::LoadFailed);
                });
                self.emit_load_failure(&draft_id, &error);
            }
        }

        if self.state().status == SaveStatus::Dirty {
            self.notify_change();
        }
        self.state()
    }

    fn apply_hydrated(&self, draft: Draft) {
        let server_token = draft.version_token().map(str::to_string);
        let recorded_token = self.session().version_token.clone();

        let values = self.form.current_values();
        let local = self.form.to_payload(&values);
        let last_saved = self.last_saved_payload();
        let unsaved_local =
            local.has_substantive_content() && self.form.is_dirty(&values, last_saved.as_ref());

        if unsaved_local && server_token != recorded_token {
            tracing::info!(
                "Server draft {} changed while {} holds unsaved edits",
                draft.id,
                self.storage_key
            );
            self.record_conflict(Some(&draft));
            self.session().hydrated = true;
            self.update_state(|state| {
                state.status = SaveStatus::Conflict;
                state.error = Some(SaveErrorKind::Conflict);
                state.conflict_draft = Some(draft);
            });
            return;
        }

        if unsaved_local {
            // Server copy is the one the snapshot was saved against; the form is newer.
            tracing::info!(
                "Keeping unsaved edits in {} over unchanged draft {}",
                self.storage_key,
                draft.id
            );
            {
                let mut session = self.session();
                session.version_token = server_token;
                session.hydrated = true;
            }
            self.update_state(|state| {
                state.status = SaveStatus::Dirty;
                state.error = None;
                state.conflict_draft = None;
            });
            return;
        }

        self.adopt_server_draft(&draft);
        self.session().hydrated = true;
        self.update_state(|state| {
            state.status = SaveStatus::Saved;
            state.error = None;
            state.conflict_draft = None;
        });
    }

    /// Load a server draft into the form and record it as the saved state.
    pub(super) fn adopt_server_draft(&self, draft: &Draft) {
        self.form.apply_draft(draft);
        let snapshot = self
            .form
            .to_payload(&self.form.current_values())
            .snapshot();
        let token = draft.version_token().map(str::to_string);

        let draft_id = {
            let mut session = self.session();
            if session.draft_id.is_none() {
                session.draft_id = Some(draft.id.clone());
            }
            session.version_token.clone_from(&token);
            session.snapshot.clone_from(&snapshot);
            session.draft_id.clone()
        };

        let last_saved_at = self
            .state()
            .last_saved_at
            .or_else(|| Some(advance_timestamp(None)));
        self.persist(&LocalSnapshotRecord {
            draft_id: draft_id.clone(),
            updated_at: token,
            snapshot,
            last_saved_at,
            server_updated_at: None,
        });
        self.update_state(|state| {
            state.draft_id = draft_id;
            state.last_saved_at = last_saved_at;
        });
    }

    pub(super) async fn clear_draft(&self) -> SaveState {
        if !self.options.enabled {
            return self.state();
        }
        self.scheduler.cancel();

        let draft_id = self.session().draft_id.clone();
        if let Some(draft_id) = draft_id {
            match self.transport.delete(&draft_id).await {
                Ok(()) => tracing::info!("Deleted draft {}", draft_id),
                Err(error) if error.is_not_found() => {}
                Err(error) => tracing::warn!("Failed to delete draft {}: {}", draft_id, error),
            }
        }

        self.forget_draft();
        self.session().hydrated = true;
        *self.rate_limit() = None;
        self.update_state(|state| *state = SaveState::default());
        self.state()
    }

    /// Drop the draft identity, the local record and the saved snapshot.
    fn forget_draft(&self) {
        {
            let mut session = self.session();
            session.draft_id = None;
            session.version_token = None;
            session.snapshot.clear();
            session.epoch += 1;
        }
        if let Err(error) = self.store.clear(&self.storage_key) {
            tracing::warn!("Failed to clear snapshot for {}: {}", self.storage_key, error);
        }
    }

    /// Note the server's newer token without touching the saved snapshot.
    fn record_conflict(&self, server_draft: Option<&Draft>) {
        let Some(token) = server_draft.and_then(Draft::version_token) else {
            return;
        };
        let last_saved_at = self.state().last_saved_at;
        let record = {
            let session = self.session();
            if session.draft_id.is_none() {
                return;
            }
            LocalSnapshotRecord {
                draft_id: session.draft_id.clone(),
                updated_at: session.version_token.clone(),
                snapshot: session.snapshot.clone(),
                last_saved_at,
                server_updated_at: Some(token.to_string()),
            }
        };
        self.persist(&record);
    }

    fn persist(&self, record: &LocalSnapshotRecord) {
        if let Err(error) = self.store.write(&self.storage_key, record) {
            tracing::warn!("Failed to persist snapshot for {}: {}", self.storage_key, error);
        }
    }

    pub(super) fn emit(
        &self,
        name: MetricName,
        origin: SaveOrigin,
        reason: Option<MetricReason>,
        error: Option<SaveErrorKind>,
        http_status: Option<u16>,
    ) {
        let state = self.state();
        self.metrics.emit(&DraftMetricEvent {
            name,
            status: state.status,
            origin,
            board_id: self.options.board_id.clone(),
            draft_id: state.draft_id.or_else(|| self.session().draft_id.clone()),
            reason,
            error,
            http_status,
            timestamp: now(),
        });
    }

    fn emit_load_failure(&self, draft_id: &DraftId, error: &TransportError) {
        let state = self.state();
        self.metrics.emit(&DraftMetricEvent {
            name: MetricName::LoadFailure,
            status: state.status,
            origin: SaveOrigin::Manual,
            board_id: self.options.board_id.clone(),
            draft_id: Some(draft_id.clone()),
            reason: Some(MetricReason::LoadFailed),
            error: Some(SaveErrorKind::LoadFailed),
            http_status: error.http_status(),
            timestamp: now(),
        });
    }

    pub(super) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.dispose();
        if let Some(ticker) = self.ticker().take() {
            ticker.abort();
        }
        tracing::debug!("Disposed autosave for {}", self.storage_key);
    }
}

impl<F, T, S, M> Drop for SaveCoordinator<F, T, S, M> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            ticker.abort();
        }
    }
}

const fn failure_reason(kind: SaveErrorKind) -> MetricReason {
    match kind {
        SaveErrorKind::Conflict => MetricReason::HttpConflict,
        SaveErrorKind::RateLimited => MetricReason::RateLimited,
        SaveErrorKind::NetworkError => MetricReason::NetworkError,
        SaveErrorKind::ValidationError => MetricReason::ValidationError,
        SaveErrorKind::LoadFailed => MetricReason::LoadFailed,
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

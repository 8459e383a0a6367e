use std::path::Path;
use std::sync::Arc;

use quire_core::form::FormAdapter;
use quire_core::metrics::MetricsEmitter;
use quire_core::snapshot::SnapshotStore;
use quire_core::transport::DraftTransport;
use quire_core::{ConflictResolution, DraftAutosave, SaveState};

use crate::cli::OnConflict;
use crate::commands::common::{format_state_line, open_autosave, state_outcome, SessionSettings};
use crate::error::CliError;
use crate::form_file::JsonFileForm;

pub async fn run_save(
    settings: &SessionSettings,
    form_path: &Path,
    on_conflict: OnConflict,
    as_json: bool,
) -> Result<(), CliError> {
    let form = Arc::new(JsonFileForm::open(form_path, settings.post_id.clone())?);
    let autosave = open_autosave(settings, Arc::clone(&form))?;
    let state = save_form(&autosave, on_conflict).await;
    autosave.dispose();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", format_state_line(&state));
    }

    state_outcome(&state)
}

/// Hydrate, save once and apply the requested conflict strategy.
pub async fn save_form<F, T, S, M>(
    autosave: &DraftAutosave<F, T, S, M>,
    on_conflict: OnConflict,
) -> SaveState
where
    F: FormAdapter,
    T: DraftTransport,
    S: SnapshotStore,
    M: MetricsEmitter,
{
    autosave.hydrate().await;
    let state = autosave.trigger_save().await;

    if state.is_conflict() {
        if let Some(resolution) = conflict_resolution(on_conflict) {
            if autosave.resolve_conflict(resolution).await {
                return autosave.state();
            }
        }
    }
    state
}

pub const fn conflict_resolution(on_conflict: OnConflict) -> Option<ConflictResolution> {
    match on_conflict {
        OnConflict::Abort => None,
        OnConflict::KeepLocal => Some(ConflictResolution::KeepLocal),
        OnConflict::DiscardLocal => Some(ConflictResolution::DiscardLocal),
    }
}

use quire_core::form::MappedForm;
use quire_core::DraftPayload;

use crate::commands::common::{format_state_line, open_autosave, SessionSettings};
use crate::error::CliError;

pub async fn run_clear(settings: &SessionSettings) -> Result<(), CliError> {
    let autosave = open_autosave(settings, MappedForm::for_payload(DraftPayload::default()))?;
    let draft_id = autosave.state().draft_id;

    let state = autosave.clear_draft().await;
    autosave.dispose();

    match draft_id {
        Some(id) => println!("Cleared draft {id} for {}", autosave.storage_key()),
        None => println!("No draft recorded for {}", autosave.storage_key()),
    }
    tracing::debug!("State after clear: {}", format_state_line(&state));
    Ok(())
}

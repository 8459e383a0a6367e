use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quire_core::SaveStatus;

use crate::commands::common::{format_state_line, open_autosave, SessionSettings};
use crate::error::CliError;
use crate::form_file::JsonFileForm;

pub async fn run_watch(
    settings: &SessionSettings,
    form_path: &Path,
    poll: Duration,
) -> Result<(), CliError> {
    let form = Arc::new(JsonFileForm::open(form_path, settings.post_id.clone())?);
    let autosave = open_autosave(settings, Arc::clone(&form))?;
    let mut states = autosave.subscribe();

    let initial = autosave.start().await;
    println!("{}", format_state_line(&initial));
    println!("Watching {} (Ctrl-C to stop)", form.path().display());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(poll.max(Duration::from_millis(50)));

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => match form.reload() {
                Ok(true) => autosave.notify_change(),
                Ok(false) => {}
                Err(error) => tracing::warn!("Skipping unreadable form file: {}", error),
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if state.status == SaveStatus::Saving {
                    continue;
                }
                println!("{}", format_state_line(&state));
                if state.is_conflict() {
                    println!(
                        "Edits are paused. Run `quire save {} --on-conflict keep-local` or `--on-conflict discard-local`.",
                        form.path().display()
                    );
                }
            }
        }
    }

    autosave.dispose();
    println!("Stopped watching {}", form.path().display());
    Ok(())
}

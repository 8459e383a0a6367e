use std::env;
use std::path::PathBuf;

use quire_core::form::FormAdapter;
use quire_core::metrics::TracingMetrics;
use quire_core::snapshot::{SnapshotStore, SqliteSnapshotStore};
use quire_core::transport::HttpDraftTransport;
use quire_core::{AutosaveConfig, AutosaveOptions, DraftAutosave, SaveState, SaveStatus};

use crate::cli::GlobalArgs;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

const ENV_BOARD_ID: &str = "QUIRE_BOARD_ID";
const ENV_ACCESS_TOKEN: &str = "QUIRE_ACCESS_TOKEN";
const ENV_SNAPSHOT_DB: &str = "QUIRE_SNAPSHOT_DB";

pub type CliAutosave<F> = DraftAutosave<F, HttpDraftTransport, SqliteSnapshotStore, TracingMetrics>;

/// Everything a command needs to open an autosave session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub board_id: String,
    pub post_id: Option<String>,
    pub config: AutosaveConfig,
    pub access_token: Option<String>,
    pub snapshot_db: PathBuf,
}

impl SessionSettings {
    pub fn options(&self) -> AutosaveOptions {
        let options = AutosaveOptions::new(self.board_id.clone());
        match &self.post_id {
            Some(post_id) => options.with_post_id(post_id.clone()),
            None => options,
        }
    }
}

/// Resolve settings from flags, then the selected profile, then the environment.
pub fn resolve_settings(globals: &GlobalArgs) -> Result<SessionSettings, CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = profiles.resolve_profile_name(globals.profile.as_deref());
    let profile = profiles.profile(&profile_name).cloned().unwrap_or_default();
    let config = AutosaveConfig::from_env()?;
    merge_settings(globals, &profile, config, |key| env::var(key).ok())
}

pub fn merge_settings(
    globals: &GlobalArgs,
    profile: &CliProfile,
    mut config: AutosaveConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SessionSettings, CliError> {
    if let Some(url) = normalize_text_option(globals.api_base_url.clone())
        .or_else(|| normalize_text_option(profile.api_base_url.clone()))
    {
        config = config.with_api_base_url(&url)?;
    }

    let board_id = normalize_text_option(globals.board.clone())
        .or_else(|| normalize_text_option(profile.board_id.clone()))
        .or_else(|| normalize_text_option(lookup(ENV_BOARD_ID)))
        .ok_or(CliError::MissingBoard)?;

    let access_token = normalize_text_option(profile.access_token.clone())
        .or_else(|| normalize_text_option(lookup(ENV_ACCESS_TOKEN)));

    let snapshot_db = globals
        .snapshot_db
        .clone()
        .or_else(|| normalize_text_option(lookup(ENV_SNAPSHOT_DB)).map(PathBuf::from))
        .unwrap_or_else(default_snapshot_db_path);

    Ok(SessionSettings {
        board_id,
        post_id: normalize_text_option(globals.post.clone()),
        config,
        access_token,
        snapshot_db,
    })
}

pub fn default_snapshot_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quire")
        .join("snapshots.db")
}

pub fn open_store(settings: &SessionSettings) -> Result<SqliteSnapshotStore, CliError> {
    if let Some(parent) = settings.snapshot_db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteSnapshotStore::open(&settings.snapshot_db)?)
}

pub fn open_autosave<F: FormAdapter>(
    settings: &SessionSettings,
    form: F,
) -> Result<CliAutosave<F>, CliError> {
    let mut transport = HttpDraftTransport::new(&settings.config)?;
    if let Some(token) = &settings.access_token {
        transport = transport.with_bearer_token(token.clone());
    }
    let store = open_store(settings)?;
    tracing::debug!(
        "Opening autosave session for board {} with snapshots at {}",
        settings.board_id,
        settings.snapshot_db.display()
    );

    Ok(DraftAutosave::new(
        settings.options(),
        &settings.config,
        form,
        transport,
        store,
        TracingMetrics,
    ))
}

/// Read the stored record for the session, if any.
pub fn stored_record(
    settings: &SessionSettings,
) -> Result<Option<quire_core::LocalSnapshotRecord>, CliError> {
    let store = open_store(settings)?;
    Ok(store.read(&settings.options().storage_key()))
}

pub fn format_state_line(state: &SaveState) -> String {
    let draft = state
        .draft_id
        .as_ref()
        .map_or_else(|| "new draft".to_string(), |id| format!("draft {id}"));
    let saved_at = state.last_saved_at.map_or_else(
        || "never saved".to_string(),
        |at| format!("last saved {}", at.to_rfc3339()),
    );

    match state.status {
        SaveStatus::Error => format!(
            "error: {} ({draft}, {saved_at})",
            state.error.map_or("unknown", |kind| kind.label())
        ),
        SaveStatus::Conflict => {
            let remote = state
                .conflict_draft
                .as_ref()
                .and_then(|draft| draft.version_token())
                .unwrap_or("unknown");
            format!("conflict: server copy updated at {remote} ({draft})")
        }
        status => format!("{status} ({draft}, {saved_at})"),
    }
}

/// Map a settled state to the command outcome.
pub fn state_outcome(state: &SaveState) -> Result<(), CliError> {
    match state.status {
        SaveStatus::Conflict => Err(CliError::Conflict(
            state
                .draft_id
                .as_ref()
                .map_or_else(|| "(new)".to_string(), ToString::to_string),
        )),
        SaveStatus::Error => Err(CliError::SaveFailed(
            state
                .error
                .map_or_else(|| "unknown error".to_string(), |kind| kind.label().to_string()),
        )),
        _ => Ok(()),
    }
}

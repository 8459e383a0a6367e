use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use pretty_assertions::assert_eq;
use quire_core::form::FormAdapter;
use quire_core::metrics::NoopMetrics;
use quire_core::snapshot::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
use quire_core::transport::{DraftTransport, TransportError, TransportResult};
use quire_core::{
    AutosaveConfig, AutosaveOptions, ConflictResolution, Draft, DraftAutosave, DraftId,
    DraftPayload, LocalSnapshotRecord, SaveErrorKind, SaveState, SaveStatus, StorageKey,
};
use serde_json::{json, Value};

use crate::cli::{Cli, Commands, GlobalArgs, OnConflict};
use crate::commands::common::{
    format_state_line, merge_settings, state_outcome, stored_record, SessionSettings,
};
use crate::commands::config::apply_profile_updates;
use crate::commands::save::{conflict_resolution, save_form};
use crate::config_profiles::CliProfile;
use crate::error::CliError;
use crate::form_file::JsonFileForm;

fn write_form(dir: &Path, value: &Value) -> PathBuf {
    let path = dir.join("form.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn server_draft(id: &str, title: &str, content: &str) -> Draft {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "content": content,
        "metadata": {"tags": ["remote"]},
        "status": "active",
        "updated_at": "2026-03-01T12:00:00Z"
    }))
    .unwrap()
}

fn settings_in(dir: &Path) -> SessionSettings {
    SessionSettings {
        board_id: "general".to_string(),
        post_id: None,
        config: AutosaveConfig::default(),
        access_token: None,
        snapshot_db: dir.join("snapshots.db"),
    }
}

struct EchoTransport;

impl EchoTransport {
    fn echo(id: &str, payload: &DraftPayload) -> Draft {
        let mut draft = server_draft(id, &payload.title, &payload.content);
        draft.metadata = payload.metadata.clone();
        draft.post_id = payload.post_id.clone();
        draft
    }
}

impl DraftTransport for EchoTransport {
    async fn create(&self, payload: &DraftPayload) -> TransportResult<Draft> {
        Ok(Self::echo("draft-1", payload))
    }

    async fn update(
        &self,
        id: &DraftId,
        payload: &DraftPayload,
        _if_unmodified_since: Option<&str>,
    ) -> TransportResult<Draft> {
        Ok(Self::echo(id.as_str(), payload))
    }

    async fn fetch(&self, _id: &DraftId) -> TransportResult<Draft> {
        Err(TransportError::Validation {
            status: 404,
            message: "Draft not found".to_string(),
        })
    }

    async fn delete(&self, _id: &DraftId) -> TransportResult<()> {
        Ok(())
    }
}

/// Keeps the last written draft so a later session can fetch it back.
#[derive(Clone, Default)]
struct SharedServer {
    draft: Arc<Mutex<Option<Draft>>>,
    revision: Arc<AtomicU32>,
}

impl SharedServer {
    fn current(&self) -> Option<Draft> {
        self.draft.lock().unwrap().clone()
    }

    fn store(&self, id: &str, payload: &DraftPayload) -> Draft {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let mut draft = EchoTransport::echo(id, payload);
        draft.updated_at = Some(format!("2026-03-01T12:00:{revision:02}Z"));
        *self.draft.lock().unwrap() = Some(draft.clone());
        draft
    }
}

impl DraftTransport for SharedServer {
    async fn create(&self, payload: &DraftPayload) -> TransportResult<Draft> {
        Ok(self.store("draft-1", payload))
    }

    async fn update(
        &self,
        id: &DraftId,
        payload: &DraftPayload,
        _if_unmodified_since: Option<&str>,
    ) -> TransportResult<Draft> {
        Ok(self.store(id.as_str(), payload))
    }

    async fn fetch(&self, _id: &DraftId) -> TransportResult<Draft> {
        self.current().ok_or_else(|| TransportError::Validation {
            status: 404,
            message: "Draft not found".to_string(),
        })
    }

    async fn delete(&self, _id: &DraftId) -> TransportResult<()> {
        *self.draft.lock().unwrap() = None;
        Ok(())
    }
}

#[test]
fn form_file_maps_draft_fields_and_defaults_post_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(
        dir.path(),
        &json!({
            "title": "Launch notes",
            "content": "Body",
            "metadata": {"tags": ["release"]},
            "cursor": 42
        }),
    );
    let form = JsonFileForm::open(&path, Some("post-7".to_string())).unwrap();

    let payload = form.to_payload(&form.current_values());
    assert_eq!(payload.title, "Launch notes");
    assert_eq!(payload.content, "Body");
    assert_eq!(payload.metadata.get("tags"), Some(&json!(["release"])));
    assert_eq!(payload.post_id.as_deref(), Some("post-7"));
}

#[test]
fn form_file_prefers_post_id_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(dir.path(), &json!({"title": "t", "post_id": 12}));
    let form = JsonFileForm::open(&path, Some("post-7".to_string())).unwrap();

    let payload = form.to_payload(&form.current_values());
    assert_eq!(payload.post_id.as_deref(), Some("12"));
    assert_eq!(payload.content, "");
}

#[test]
fn form_file_rejects_non_object_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(dir.path(), &json!(["not", "a", "form"]));

    let error = JsonFileForm::open(&path, None).unwrap_err();
    assert!(matches!(error, CliError::InvalidForm { .. }));
}

#[test]
fn form_file_reload_reports_changes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(dir.path(), &json!({"title": "one"}));
    let form = JsonFileForm::open(&path, None).unwrap();

    assert!(!form.reload().unwrap());
    write_form(dir.path(), &json!({"title": "two"}));
    assert!(form.reload().unwrap());
    assert!(!form.reload().unwrap());
    assert_eq!(form.to_payload(&form.current_values()).title, "two");
}

#[test]
fn apply_draft_writes_back_and_keeps_unrelated_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(
        dir.path(),
        &json!({"title": "local", "content": "mine", "cursor": 42}),
    );
    let form = JsonFileForm::open(&path, None).unwrap();

    form.apply_draft(&server_draft("draft-9", "remote", "theirs"));

    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["title"], json!("remote"));
    assert_eq!(on_disk["content"], json!("theirs"));
    assert_eq!(on_disk["metadata"], json!({"tags": ["remote"]}));
    assert_eq!(on_disk["cursor"], json!(42));
    assert!(!form.reload().unwrap());
}

#[tokio::test(flavor = "current_thread")]
async fn saving_a_form_file_records_the_draft_locally() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(dir.path(), &json!({"title": "Hello", "content": "World"}));
    let form = Arc::new(JsonFileForm::open(&path, None).unwrap());
    let store = MemorySnapshotStore::new();
    let autosave = DraftAutosave::new(
        AutosaveOptions::new("general"),
        &AutosaveConfig::default().without_interval(),
        Arc::clone(&form),
        EchoTransport,
        store.clone(),
        NoopMetrics,
    );

    let state = autosave.trigger_save().await;
    autosave.dispose();

    assert_eq!(state.status, SaveStatus::Saved);
    assert_eq!(state.draft_id, Some(DraftId::from("draft-1")));
    let record = store
        .read(&StorageKey::for_draft("general", None))
        .unwrap();
    assert_eq!(record.updated_at.as_deref(), Some("2026-03-01T12:00:00Z"));
    assert_eq!(record.payload().unwrap().title, "Hello");
}

#[tokio::test(flavor = "current_thread")]
async fn second_save_keeps_form_edits_made_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_form(dir.path(), &json!({"title": "Hello", "content": "First"}));
    let store = MemorySnapshotStore::new();
    let server = SharedServer::default();
    let config = AutosaveConfig::default().without_interval();

    let first = DraftAutosave::new(
        AutosaveOptions::new("general"),
        &config,
        Arc::new(JsonFileForm::open(&path, None).unwrap()),
        server.clone(),
        store.clone(),
        NoopMetrics,
    );
    assert_eq!(save_form(&first, OnConflict::Abort).await.status, SaveStatus::Saved);
    first.dispose();

    write_form(
        dir.path(),
        &json!({"title": "Hello", "content": "Edited offline"}),
    );

    let second = DraftAutosave::new(
        AutosaveOptions::new("general"),
        &config,
        Arc::new(JsonFileForm::open(&path, None).unwrap()),
        server.clone(),
        store.clone(),
        NoopMetrics,
    );
    let state = save_form(&second, OnConflict::Abort).await;
    second.dispose();

    assert_eq!(state.status, SaveStatus::Saved);
    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["content"], json!("Edited offline"));
    assert_eq!(server.current().unwrap().content, "Edited offline");
    let record = store
        .read(&StorageKey::for_draft("general", None))
        .unwrap();
    assert_eq!(record.payload().unwrap().content, "Edited offline");
    assert_eq!(record.updated_at.as_deref(), Some("2026-03-01T12:00:02Z"));
}

#[test]
fn stored_record_reads_the_session_key() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    assert_eq!(stored_record(&settings).unwrap(), None);

    let store = SqliteSnapshotStore::open(&settings.snapshot_db).unwrap();
    let record = LocalSnapshotRecord {
        draft_id: Some(DraftId::from("draft-3")),
        updated_at: Some("2026-03-01T12:00:00Z".to_string()),
        snapshot: DraftPayload::new("Title", "Body").snapshot(),
        last_saved_at: None,
        server_updated_at: None,
    };
    store
        .write(&settings.options().storage_key(), &record)
        .unwrap();

    assert_eq!(stored_record(&settings).unwrap(), Some(record));
}

#[test]
fn merge_settings_prefers_flags_then_profile_then_env() {
    let profile = CliProfile {
        api_base_url: Some("https://profile.example.com".to_string()),
        board_id: Some("from-profile".to_string()),
        access_token: Some("profile-token".to_string()),
    };
    let env = |key: &str| match key {
        "QUIRE_BOARD_ID" => Some("from-env".to_string()),
        "QUIRE_ACCESS_TOKEN" => Some("env-token".to_string()),
        _ => None,
    };

    let flags = GlobalArgs {
        board: Some("from-flag".to_string()),
        post: Some(" post-1 ".to_string()),
        api_base_url: Some("http://localhost:8080/".to_string()),
        ..GlobalArgs::default()
    };
    let settings = merge_settings(&flags, &profile, AutosaveConfig::default(), env).unwrap();
    assert_eq!(settings.board_id, "from-flag");
    assert_eq!(settings.post_id.as_deref(), Some("post-1"));
    assert_eq!(
        settings.config.api_base_url.as_deref(),
        Some("http://localhost:8080")
    );
    assert_eq!(settings.access_token.as_deref(), Some("profile-token"));

    let settings =
        merge_settings(&GlobalArgs::default(), &profile, AutosaveConfig::default(), env).unwrap();
    assert_eq!(settings.board_id, "from-profile");
    assert_eq!(
        settings.config.api_base_url.as_deref(),
        Some("https://profile.example.com")
    );

    let settings = merge_settings(
        &GlobalArgs::default(),
        &CliProfile::default(),
        AutosaveConfig::default(),
        env,
    )
    .unwrap();
    assert_eq!(settings.board_id, "from-env");
    assert_eq!(settings.access_token.as_deref(), Some("env-token"));
}

#[test]
fn merge_settings_requires_a_board() {
    let error = merge_settings(
        &GlobalArgs::default(),
        &CliProfile::default(),
        AutosaveConfig::default(),
        |_| None,
    )
    .unwrap_err();
    assert!(matches!(error, CliError::MissingBoard));
}

#[test]
fn merge_settings_rejects_urls_without_scheme() {
    let flags = GlobalArgs {
        board: Some("general".to_string()),
        api_base_url: Some("api.example.com".to_string()),
        ..GlobalArgs::default()
    };
    let error =
        merge_settings(&flags, &CliProfile::default(), AutosaveConfig::default(), |_| None)
            .unwrap_err();
    assert!(matches!(error, CliError::Core(quire_core::Error::Config(_))));
}

#[test]
fn apply_profile_updates_normalizes_and_keeps_existing_values() {
    let mut profile = CliProfile {
        board_id: Some("general".to_string()),
        ..CliProfile::default()
    };
    apply_profile_updates(
        &mut profile,
        Some(" https://api.example.com/ ".to_string()),
        None,
        Some(" token ".to_string()),
    )
    .unwrap();

    assert_eq!(profile.api_base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(profile.board_id.as_deref(), Some("general"));
    assert_eq!(profile.access_token.as_deref(), Some("token"));

    let error = apply_profile_updates(&mut profile, Some("ftp://x".to_string()), None, None)
        .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
}

#[test]
fn format_state_line_describes_each_outcome() {
    let saved = SaveState {
        status: SaveStatus::Saved,
        draft_id: Some(DraftId::from("draft-1")),
        ..SaveState::default()
    };
    assert_eq!(format_state_line(&saved), "saved (draft draft-1, never saved)");

    let failed = SaveState {
        status: SaveStatus::Error,
        error: Some(SaveErrorKind::RateLimited),
        ..SaveState::default()
    };
    assert_eq!(
        format_state_line(&failed),
        "error: rate_limited (new draft, never saved)"
    );

    let conflict = SaveState {
        status: SaveStatus::Conflict,
        error: Some(SaveErrorKind::Conflict),
        conflict_draft: Some(server_draft("draft-1", "remote", "theirs")),
        draft_id: Some(DraftId::from("draft-1")),
        ..SaveState::default()
    };
    assert_eq!(
        format_state_line(&conflict),
        "conflict: server copy updated at 2026-03-01T12:00:00Z (draft draft-1)"
    );
}

#[test]
fn state_outcome_fails_on_conflict_and_error() {
    assert!(state_outcome(&SaveState::default()).is_ok());

    let conflict = SaveState {
        status: SaveStatus::Conflict,
        draft_id: Some(DraftId::from("draft-1")),
        ..SaveState::default()
    };
    assert!(matches!(
        state_outcome(&conflict),
        Err(CliError::Conflict(id)) if id == "draft-1"
    ));

    let failed = SaveState {
        status: SaveStatus::Error,
        error: Some(SaveErrorKind::NetworkError),
        ..SaveState::default()
    };
    assert!(matches!(
        state_outcome(&failed),
        Err(CliError::SaveFailed(kind)) if kind == "network_error"
    ));
}

#[test]
fn on_conflict_flag_maps_to_resolution() {
    assert_eq!(conflict_resolution(OnConflict::Abort), None);
    assert_eq!(
        conflict_resolution(OnConflict::KeepLocal),
        Some(ConflictResolution::KeepLocal)
    );
    assert_eq!(
        conflict_resolution(OnConflict::DiscardLocal),
        Some(ConflictResolution::DiscardLocal)
    );
}

#[test]
fn cli_parses_save_with_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "quire",
        "save",
        "form.json",
        "--on-conflict",
        "discard-local",
        "--board",
        "general",
        "--json",
    ])
    .unwrap();

    assert_eq!(cli.globals.board.as_deref(), Some("general"));
    match cli.command {
        Commands::Save {
            form,
            on_conflict,
            json,
        } => {
            assert_eq!(form, PathBuf::from("form.json"));
            assert_eq!(on_conflict, OnConflict::DiscardLocal);
            assert!(json);
        }
        _ => panic!("expected save command"),
    }
}

#[test]
fn cli_rejects_unknown_conflict_strategy() {
    assert!(Cli::try_parse_from(["quire", "save", "form.json", "--on-conflict", "merge"]).is_err());
}

use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub name: String,
    pub active: bool,
    pub api_base_url: Option<String>,
    pub board_id: Option<String>,
    pub has_access_token: bool,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Set {
            api_base_url,
            board_id,
            access_token,
            no_activate,
        } => run_config_set(
            global_profile,
            api_base_url,
            board_id,
            access_token,
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, json),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_set(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    board_id: Option<String>,
    access_token: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_profile_updates(profile, api_base_url, board_id, access_token)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Profile '{}' saved to {}", profile_name, path.display());
    Ok(())
}

pub fn apply_profile_updates(
    profile: &mut CliProfile,
    api_base_url: Option<String>,
    board_id: Option<String>,
    access_token: Option<String>,
) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(api_base_url) {
        let url = quire_core::util::normalize_base_url(&url)
            .map_err(|error| CliError::Config(format!("api_base_url: {error}")))?;
        profile.api_base_url = Some(url);
    }
    if let Some(board_id) = normalize_text_option(board_id) {
        profile.board_id = Some(board_id);
    }
    if let Some(token) = normalize_text_option(access_token) {
        profile.access_token = Some(token);
    }
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&name).cloned().unwrap_or_default();
    let view = ProfileView {
        active: config.active_profile.as_deref() == Some(name.as_str()),
        name,
        api_base_url: profile.api_base_url,
        board_id: profile.board_id,
        has_access_token: profile.access_token.is_some(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!(
        "Profile:      {}{}",
        view.name,
        if view.active { " (active)" } else { "" }
    );
    println!(
        "API base URL: {}",
        view.api_base_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Board:        {}",
        view.board_id.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Access token: {}",
        if view.has_access_token { "set" } else { "(not set)" }
    );
    Ok(())
}

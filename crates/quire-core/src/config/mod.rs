//! Autosave configuration.
//!
//! Timing knobs for the debounce scheduler and periodic autosave, plus the
//! endpoint the HTTP transport talks to. Values come from defaults, from the
//! environment, or from a CLI profile.

use std::env;
use std::time::Duration;

use crate::util::{normalize_base_url, normalize_text_option};
use crate::{Error, Result};

pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 8000;
pub const DEFAULT_DRAFTS_PATH: &str = "/drafts";

const ENV_API_BASE_URL: &str = "QUIRE_API_BASE_URL";
const ENV_DRAFTS_PATH: &str = "QUIRE_DRAFTS_PATH";
const ENV_DEBOUNCE_MS: &str = "QUIRE_DEBOUNCE_MS";
const ENV_INTERVAL_MS: &str = "QUIRE_AUTOSAVE_INTERVAL_MS";
const ENV_REQUEST_TIMEOUT_MS: &str = "QUIRE_REQUEST_TIMEOUT_MS";

/// Engine and transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveConfig {
    /// Base URL of the draft API, without trailing slash.
    pub api_base_url: Option<String>,
    /// Collection path appended to the base URL.
    pub drafts_path: String,
    /// Quiet period before an edit burst is saved.
    pub debounce: Duration,
    /// Periodic autosave; `None` disables the ticker.
    pub interval: Option<Duration>,
    /// Per-request timeout enforced by the transport.
    pub request_timeout: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            drafts_path: DEFAULT_DRAFTS_PATH.to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            interval: Some(Duration::from_millis(DEFAULT_INTERVAL_MS)),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl AutosaveConfig {
    /// Load configuration from `QUIRE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        parse_config(|key| env::var(key).ok())
    }

    /// Set the API base URL, validating the scheme.
    pub fn with_api_base_url(mut self, url: &str) -> Result<Self> {
        self.api_base_url = Some(normalize_base_url(url).map_err(Error::Config)?);
        Ok(self)
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Disable periodic autosave (debounce and manual saves only)
    #[must_use]
    pub const fn without_interval(mut self) -> Self {
        self.interval = None;
        self
    }

    /// Full URL of the drafts collection, when a base URL is configured.
    pub fn drafts_url(&self) -> Option<String> {
        let base = self.api_base_url.as_deref()?;
        Some(format!("{base}{}", self.drafts_path))
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<AutosaveConfig> {
    let mut config = AutosaveConfig::default();

    if let Some(url) = normalize_text_option(lookup(ENV_API_BASE_URL)) {
        let url = normalize_base_url(&url)
            .map_err(|error| Error::Config(format!("{ENV_API_BASE_URL}: {error}")))?;
        config.api_base_url = Some(url);
    }

    if let Some(path) = normalize_text_option(lookup(ENV_DRAFTS_PATH)) {
        config.drafts_path = normalize_drafts_path(&path);
    }

    if let Some(ms) = parse_millis(&lookup, ENV_DEBOUNCE_MS)? {
        config.debounce = Duration::from_millis(ms);
    }

    if let Some(ms) = parse_millis(&lookup, ENV_INTERVAL_MS)? {
        config.interval = (ms > 0).then(|| Duration::from_millis(ms));
    }

    if let Some(ms) = parse_millis(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
        if ms == 0 {
            return Err(Error::Config(format!(
                "{ENV_REQUEST_TIMEOUT_MS} must be greater than zero"
            )));
        }
        config.request_timeout = Duration::from_millis(ms);
    }

    Ok(config)
}

fn parse_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    raw.parse::<u64>().map(Some).map_err(|_| {
        Error::Config(format!(
            "{key} must be a whole number of milliseconds, got '{raw}'"
        ))
    })
}

/// Collection paths always start with a slash and never end with one.
pub fn normalize_drafts_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        DEFAULT_DRAFTS_PATH.to_string()
    } else {
        format!("/{trimmed}")
    }
}

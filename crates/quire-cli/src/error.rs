use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] quire_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No board configured. Pass --board, run `quire config set --default-board <ID>`, or set QUIRE_BOARD_ID."
    )]
    MissingBoard,
    #[error("Invalid form file {path}: {reason}")]
    InvalidForm { path: String, reason: String },
    #[error("Draft {0} has diverged on the server. Re-run with --on-conflict keep-local or discard-local.")]
    Conflict(String),
    #[error("Draft save failed: {0}")]
    SaveFailed(String),
}

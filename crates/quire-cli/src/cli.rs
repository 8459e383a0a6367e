use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Keep editor drafts persisted against a draft API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub globals: GlobalArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Board the draft belongs to
    #[arg(long, global = true, value_name = "ID")]
    pub board: Option<String>,

    /// Published post being edited (omit for a new post)
    #[arg(long, global = true, value_name = "ID")]
    pub post: Option<String>,

    /// Draft API base URL (e.g. <https://api.example.com>)
    #[arg(long, global = true, value_name = "URL")]
    pub api_base_url: Option<String>,

    /// Optional path to the local snapshot database
    #[arg(long, global = true, value_name = "PATH")]
    pub snapshot_db: Option<PathBuf>,

    /// CLI profile name
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a form file once
    Save {
        /// JSON form file with title/content/metadata fields
        form: PathBuf,
        /// What to do when the server copy has diverged
        #[arg(long, value_enum, default_value_t = OnConflict::Abort)]
        on_conflict: OnConflict,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Autosave a form file while it is being edited
    Watch {
        /// JSON form file with title/content/metadata fields
        form: PathBuf,
        /// How often to check the file for changes
        #[arg(long, default_value = "500", value_name = "MS")]
        poll_ms: u64,
    },
    /// Show the locally recorded draft for the session
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the server draft and the local record
    Clear,
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OnConflict {
    /// Leave the conflict unresolved and fail
    Abort,
    /// Overwrite the server copy with the form file
    KeepLocal,
    /// Replace the form file with the server copy
    DiscardLocal,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update a profile
    Set {
        /// Draft API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Default board id
        #[arg(long = "default-board", value_name = "ID")]
        board_id: Option<String>,
        /// Bearer token sent to the draft API
        #[arg(long, value_name = "TOKEN")]
        access_token: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print a profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

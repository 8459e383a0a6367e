//! quire-core - Core library for Quire
//!
//! This crate contains the draft models, the snapshot stores, the HTTP draft
//! transport, and the autosave engine that keeps an editor's in-progress form
//! content persisted on the server.

pub mod config;
pub mod engine;
pub mod error;
pub mod form;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod snapshot;
pub mod transport;
pub mod util;

pub use config::AutosaveConfig;
pub use engine::{AutosaveOptions, ConflictResolution, DraftAutosave};
pub use error::{Error, Result};
pub use models::{
    Draft, DraftId, DraftPayload, LocalSnapshotRecord, SaveErrorKind, SaveOrigin, SaveState,
    SaveStatus, StorageKey,
};

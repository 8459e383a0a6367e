//! Data models for Quire

mod draft;
mod record;
mod state;

pub use draft::{Draft, DraftId, DraftPayload, DraftStatus};
pub use record::{LocalSnapshotRecord, StorageKey};
pub use state::{SaveErrorKind, SaveOrigin, SaveState, SaveStatus};

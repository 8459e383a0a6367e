//! Server boundary for drafts.
//!
//! Every failure is converted into a [`TransportError`] here, so the save
//! pipeline only ever branches on typed outcomes.

mod http;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::models::{Draft, DraftId, DraftPayload, SaveErrorKind};

pub use http::HttpDraftTransport;

/// Typed failure of a draft API call.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// 409: the server copy moved on. Carries the server draft when the body had one.
    #[error("Draft conflict: {message}")]
    Conflict {
        draft: Option<Box<Draft>>,
        message: String,
    },

    /// 429
    #[error("Draft API rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other 4xx: the request was rejected as sent.
    #[error("Draft rejected: {message}")]
    Validation { status: u16, message: String },

    /// 5xx
    #[error("Draft API server error: {message}")]
    Server { status: u16, message: String },

    /// Timeout, DNS failure, refused connection.
    #[error("Draft API request failed: {0}")]
    Network(String),

    /// 2xx with a body that is not a draft.
    #[error("Invalid draft API response: {0}")]
    InvalidResponse(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// Collapse into the closed taxonomy shown to the editor.
    #[must_use]
    pub const fn kind(&self) -> SaveErrorKind {
        match self {
            Self::Conflict { .. } => SaveErrorKind::Conflict,
            Self::RateLimited { .. } => SaveErrorKind::RateLimited,
            Self::Validation { .. } => SaveErrorKind::ValidationError,
            Self::Server { .. } | Self::Network(_) | Self::InvalidResponse(_) => {
                SaveErrorKind::NetworkError
            }
        }
    }

    /// HTTP status behind the failure, when a response was received.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Conflict { .. } => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::InvalidResponse(_) => None,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Validation { status: 404, .. })
    }
}

/// Draft API operations used by the engine.
///
/// Futures are `Send` so the engine can drive saves from spawned timer tasks.
pub trait DraftTransport: Send + Sync + 'static {
    /// Create a new server draft.
    fn create(
        &self,
        payload: &DraftPayload,
    ) -> impl Future<Output = TransportResult<Draft>> + Send;

    /// Replace a draft's content. `if_unmodified_since` is the last known
    /// concurrency token; the server answers 409 when it no longer matches.
    fn update(
        &self,
        id: &DraftId,
        payload: &DraftPayload,
        if_unmodified_since: Option<&str>,
    ) -> impl Future<Output = TransportResult<Draft>> + Send;

    fn fetch(&self, id: &DraftId) -> impl Future<Output = TransportResult<Draft>> + Send;

    fn delete(&self, id: &DraftId) -> impl Future<Output = TransportResult<()>> + Send;
}

impl<T: DraftTransport> DraftTransport for Arc<T> {
    fn create(
        &self,
        payload: &DraftPayload,
    ) -> impl Future<Output = TransportResult<Draft>> + Send {
        (**self).create(payload)
    }

    fn update(
        &self,
        id: &DraftId,
        payload: &DraftPayload,
        if_unmodified_since: Option<&str>,
    ) -> impl Future<Output = TransportResult<Draft>> + Send {
        (**self).update(id, payload, if_unmodified_since)
    }

    fn fetch(&self, id: &DraftId) -> impl Future<Output = TransportResult<Draft>> + Send {
        (**self).fetch(id)
    }

    fn delete(&self, id: &DraftId) -> impl Future<Output = TransportResult<()>> + Send {
        (**self).delete(id)
    }
}

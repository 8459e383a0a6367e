//! `reqwest` client for the drafts REST API.

use std::time::Duration;

use reqwest::header::{ACCEPT, IF_UNMODIFIED_SINCE, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{DraftTransport, TransportError, TransportResult};
use crate::config::AutosaveConfig;
use crate::models::{Draft, DraftId, DraftPayload};
use crate::util::{compact_text, normalize_text_option};
use crate::{Error, Result};

/// Talks to `POST /drafts`, `PUT|GET|DELETE /drafts/{id}`.
#[derive(Clone)]
pub struct HttpDraftTransport {
    drafts_url: String,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for HttpDraftTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpDraftTransport")
            .field("drafts_url", &self.drafts_url)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpDraftTransport {
    pub fn new(config: &AutosaveConfig) -> Result<Self> {
        let drafts_url = config
            .drafts_url()
            .ok_or_else(|| Error::Config("Draft API base URL is not configured".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::Config(format!("Failed to build HTTP client: {error}")))?;
        Ok(Self {
            drafts_url,
            client,
            bearer_token: None,
        })
    }

    /// Authenticate every request with `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = normalize_text_option(Some(token.into()));
        self
    }

    #[must_use]
    pub fn drafts_url(&self) -> &str {
        &self.drafts_url
    }

    fn draft_url(&self, id: &DraftId) -> String {
        format!("{}/{}", self.drafts_url, urlencoding::encode(id.as_str()))
    }

    fn request(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(ACCEPT, "application/json");
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> TransportResult<Response> {
        let response = self.request(request).send().await.map_err(network_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let retry_after = parse_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, retry_after, &body))
    }

    async fn send_for_draft(&self, request: RequestBuilder) -> TransportResult<Draft> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(network_error)?;
        serde_json::from_str::<Draft>(&body).map_err(|error| {
            TransportError::InvalidResponse(format!("{error}: {}", compact_text(&body)))
        })
    }
}

impl DraftTransport for HttpDraftTransport {
    async fn create(&self, payload: &DraftPayload) -> TransportResult<Draft> {
        let request = self.client.post(&self.drafts_url).json(payload);
        self.send_for_draft(request).await
    }

    async fn update(
        &self,
        id: &DraftId,
        payload: &DraftPayload,
        if_unmodified_since: Option<&str>,
    ) -> TransportResult<Draft> {
        let mut request = self.client.put(self.draft_url(id)).json(payload);
        if let Some(token) = if_unmodified_since {
            request = request.header(IF_UNMODIFIED_SINCE, token);
        }
        self.send_for_draft(request).await
    }

    async fn fetch(&self, id: &DraftId) -> TransportResult<Draft> {
        let request = self.client.get(self.draft_url(id));
        self.send_for_draft(request).await
    }

    async fn delete(&self, id: &DraftId) -> TransportResult<()> {
        let request = self.client.delete(self.draft_url(id));
        self.send(request).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
    #[serde(default)]
    draft: Option<Draft>,
}

fn classify_failure(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> TransportError {
    match status {
        StatusCode::CONFLICT => {
            let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
            let draft = parsed
                .as_ref()
                .and_then(|payload| payload.draft.clone())
                .map(Box::new);
            let message = parsed
                .and_then(|payload| payload.message.or(payload.error))
                .map_or_else(
                    || "Draft was modified by another writer".to_string(),
                    |message| message.trim().to_string(),
                );
            TransportError::Conflict { draft, message }
        }
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited { retry_after },
        status if status.is_server_error() => TransportError::Server {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
        status => TransportError::Validation {
            status: status.as_u16(),
            message: parse_api_error(status, body),
        },
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn network_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Network("request timed out".to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

//! Structured observability events for save outcomes.
//!
//! Sinks receive one [`DraftMetricEvent`] per terminal save transition.
//! Emission is infallible by signature: a sink that cannot deliver an event
//! drops it and the save pipeline carries on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{DraftId, SaveErrorKind, SaveOrigin, SaveStatus};

const BROADCAST_CAPACITY: usize = 64;

/// Event name, serialized with its dotted wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricName {
    #[serde(rename = "drafts.save.success")]
    SaveSuccess,
    #[serde(rename = "drafts.save.failure")]
    SaveFailure,
    #[serde(rename = "drafts.load.failure")]
    LoadFailure,
    #[serde(rename = "drafts.conflict.resolved")]
    ConflictResolved,
}

impl MetricName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SaveSuccess => "drafts.save.success",
            Self::SaveFailure => "drafts.save.failure",
            Self::LoadFailure => "drafts.load.failure",
            Self::ConflictResolved => "drafts.conflict.resolved",
        }
    }
}

/// Why a failure event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricReason {
    HttpConflict,
    ConflictWarning,
    RateLimited,
    NetworkError,
    ValidationError,
    LoadFailed,
    KeepLocal,
    DiscardLocal,
}

impl MetricReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HttpConflict => "http_conflict",
            Self::ConflictWarning => "conflict_warning",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
            Self::ValidationError => "validation_error",
            Self::LoadFailed => "load_failed",
            Self::KeepLocal => "keep_local",
            Self::DiscardLocal => "discard_local",
        }
    }
}

/// One observability record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMetricEvent {
    pub name: MetricName,
    pub status: SaveStatus,
    pub origin: SaveOrigin,
    pub board_id: String,
    pub draft_id: Option<DraftId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MetricReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SaveErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

/// Event sink for metric records.
pub trait MetricsEmitter: Send + Sync + 'static {
    fn emit(&self, event: &DraftMetricEvent);
}

impl<M: MetricsEmitter> MetricsEmitter for Arc<M> {
    fn emit(&self, event: &DraftMetricEvent) {
        (**self).emit(event);
    }
}

/// Fan out to two sinks.
impl<A: MetricsEmitter, B: MetricsEmitter> MetricsEmitter for (A, B) {
    fn emit(&self, event: &DraftMetricEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsEmitter for NoopMetrics {
    fn emit(&self, _event: &DraftMetricEvent) {}
}

/// Renders events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl MetricsEmitter for TracingMetrics {
    fn emit(&self, event: &DraftMetricEvent) {
        let draft_id = event.draft_id.as_ref().map(DraftId::as_str);
        let reason = event.reason.map(MetricReason::label);
        let error = event.error.map(SaveErrorKind::label);
        match event.name {
            MetricName::SaveSuccess | MetricName::ConflictResolved => tracing::info!(
                target: "quire::metrics",
                name = event.name.as_str(),
                status = event.status.label(),
                origin = ?event.origin,
                board_id = %event.board_id,
                draft_id,
                reason,
                timestamp = %event.timestamp,
            ),
            MetricName::SaveFailure | MetricName::LoadFailure => tracing::warn!(
                target: "quire::metrics",
                name = event.name.as_str(),
                status = event.status.label(),
                origin = ?event.origin,
                board_id = %event.board_id,
                draft_id,
                reason,
                error,
                http_status = event.http_status,
                timestamp = %event.timestamp,
            ),
        }
    }
}

/// Observer hub: any number of subscribers receive a copy of each event.
#[derive(Debug, Clone)]
pub struct BroadcastMetrics {
    sender: broadcast::Sender<DraftMetricEvent>,
}

impl Default for BroadcastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastMetrics {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DraftMetricEvent> {
        self.sender.subscribe()
    }
}

impl MetricsEmitter for BroadcastMetrics {
    fn emit(&self, event: &DraftMetricEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failure_event() -> DraftMetricEvent {
        DraftMetricEvent {
            name: MetricName::SaveFailure,
            status: SaveStatus::Error,
            origin: SaveOrigin::Debounce,
            board_id: "general".to_string(),
            draft_id: Some(DraftId::from("draft-1")),
            reason: Some(MetricReason::RateLimited),
            error: Some(SaveErrorKind::RateLimited),
            http_status: Some(429),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn event_serializes_with_dotted_name() {
        let value = serde_json::to_value(failure_event()).unwrap();
        assert_eq!(value["name"], "drafts.save.failure");
        assert_eq!(value["reason"], "rate_limited");
        assert_eq!(value["error"], "rate_limited");
        assert_eq!(value["boardId"], "general");
        assert_eq!(value["draftId"], "draft-1");
        assert_eq!(value["httpStatus"], 429);
    }

    #[test]
    fn broadcast_without_subscribers_does_not_fail() {
        BroadcastMetrics::new().emit(&failure_event());
    }

    #[tokio::test]
    async fn broadcast_delivers_to_every_subscriber() {
        let metrics = BroadcastMetrics::new();
        let mut first = metrics.subscribe();
        let mut second = metrics.subscribe();

        (metrics.clone(), TracingMetrics).emit(&failure_event());

        assert_eq!(first.recv().await.unwrap().name, MetricName::SaveFailure);
        assert_eq!(second.recv().await.unwrap().http_status, Some(429));
    }
}

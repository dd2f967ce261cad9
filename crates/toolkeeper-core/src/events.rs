use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Side-channel events emitted by the request engine.
/// Devtools listeners and toast/snackbar layers subscribe to them;
/// the engine never waits on a consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiEvent {
    RequestDebug {
        request_id: String,
        method: String,
        url: String,
        authorized: bool,
        at: DateTime<Utc>,
    },
    ResponseDebug {
        request_id: String,
        method: String,
        url: String,
        status: u16,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// A refresh call renewed the session.
    AuthRefreshed {
        token_rotated: bool,
        at: DateTime<Utc>,
    },
    /// The session could not be recovered; the user must log in again.
    AuthInvalid {
        message: String,
        at: DateTime<Utc>,
    },
}

impl ApiEvent {
    /// Wire name used by event-bus consumers.
    pub fn name(&self) -> &'static str {
        match self {
            ApiEvent::RequestDebug { .. } => "api:request-debug",
            ApiEvent::ResponseDebug { .. } => "api:response-debug",
            ApiEvent::AuthRefreshed { .. } => "auth:refreshed",
            ApiEvent::AuthInvalid { .. } => "auth:invalid",
        }
    }
}

/// Publish capability for [`ApiEvent`]s.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &ApiEvent);
}

/// Turns events into `tracing` records. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &ApiEvent) {
        match event {
            ApiEvent::RequestDebug {
                request_id,
                method,
                url,
                authorized,
                ..
            } => tracing::debug!(kind = event.name(), %request_id, %method, %url, authorized),
            ApiEvent::ResponseDebug {
                request_id,
                status,
                elapsed_ms,
                ..
            } => tracing::debug!(kind = event.name(), %request_id, status, elapsed_ms),
            ApiEvent::AuthRefreshed { token_rotated, .. } => {
                tracing::info!(kind = event.name(), token_rotated, "session refreshed")
            }
            ApiEvent::AuthInvalid { message, .. } => {
                tracing::warn!(kind = event.name(), %message, "session invalidated")
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &ApiEvent) {}
}

/// Fans events out to any number of in-process subscribers.
/// Publishing with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ApiEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApiEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &ApiEvent) {
        let _ = self.tx.send(event.clone());
    }
}

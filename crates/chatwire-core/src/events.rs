//! Fire-and-forget event publishing for tool code.
//!
//! Tools may publish arbitrary JSON payloads under a category label. Delivery
//! is best-effort fan-out through a `tokio::sync::broadcast` channel: a
//! publish with no subscribers is not an error, and a slow subscriber loses
//! the oldest events rather than blocking the publisher.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::context::current_session;
use crate::ids::SessionId;

/// Default number of events buffered per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// One published event.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEvent {
    /// Category label chosen by the publisher.
    pub category: String,
    /// Arbitrary JSON payload.
    pub payload: Value,
    /// Ambient session at publish time, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// RFC 3339 publish time.
    pub timestamp: String,
}

/// Publishing side of the event fan-out. Cloning shares the channel.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<PublishedEvent>,
}

impl EventSink {
    /// Create a sink buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish `payload` under `category`, tagged with the ambient session.
    pub fn publish(&self, category: impl Into<String>, payload: Value) {
        let event = PublishedEvent {
            category: category.into(),
            payload,
            session_id: current_session(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(receivers, "event published");
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

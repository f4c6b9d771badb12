//! Debug logging of events published by tools.

use chatwire_core::EventSink;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Subscribe to `events` and log each one until `shutdown` is cancelled.
pub fn spawn_event_logger(events: &EventSink, shutdown: CancellationToken) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = rx.recv() => next,
            };
            match next {
                Ok(event) => debug!(
                    category = %event.category,
                    session_id = ?event.session_id.as_deref(),
                    payload = %event.payload,
                    "tool event"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn subscribes_and_stops_on_shutdown() {
        let events = EventSink::new(4);
        let shutdown = CancellationToken::new();
        let task = spawn_event_logger(&events, shutdown.clone());
        assert_eq!(events.subscriber_count(), 1);
        events.publish("status_message", serde_json::json!({"message": "x"}));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stops_when_sink_dropped() {
        let events = EventSink::new(4);
        let task = spawn_event_logger(&events, CancellationToken::new());
        drop(events);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}

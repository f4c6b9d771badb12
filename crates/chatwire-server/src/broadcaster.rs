//! Status message fan-out.
//!
//! One long-lived task drains the [`StatusChannel`] and hands each message to
//! the connection currently registered for its session. Delivery is
//! best-effort and at-most-once: a message for an unknown or closed session
//! is logged and dropped. The broadcaster never mutates the registry; the
//! owning connection session removes its own entry.

use std::pin::pin;
use std::sync::Arc;

use chatwire_core::{StatusChannel, StatusMessage};
use futures::StreamExt;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::metrics::{STATUS_DELIVERED_TOTAL, STATUS_DROPPED_TOTAL};
use crate::websocket::frames::OutboundFrame;
use crate::websocket::registry::SessionRegistry;

/// Outcome of routing one status message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the session's connection.
    Delivered,
    /// No connection registered for the session.
    NoConnection,
    /// The registered connection is closed.
    Disconnected,
    /// The connection's outbound queue is full.
    QueueFull,
}

/// Routes status messages to live connections.
pub struct StatusBroadcaster {
    channel: StatusChannel,
    registry: Arc<SessionRegistry>,
}

impl StatusBroadcaster {
    /// Create a broadcaster over `channel` and `registry`.
    pub fn new(channel: StatusChannel, registry: Arc<SessionRegistry>) -> Self {
        Self { channel, registry }
    }

    /// Run on a new task until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Drain the channel until `shutdown` is cancelled.
    #[instrument(skip_all, name = "status_broadcaster")]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("status broadcaster started");
        let mut drain = pin!(self.channel.drain());
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = drain.next() => next,
            };
            let Some(message) = next else { break };
            let _ = self.deliver(&message);
        }
        info!("status broadcaster stopped");
    }

    /// Route one message.
    pub fn deliver(&self, message: &StatusMessage) -> Delivery {
        let session_id = message.session_id.as_str();
        let delivery = match self.registry.lookup(session_id) {
            None => Delivery::NoConnection,
            Some(handle) if !handle.is_connected() => Delivery::Disconnected,
            Some(handle) => {
                if handle.try_send_frame(&OutboundFrame::status(message.text.as_str())) {
                    Delivery::Delivered
                } else {
                    Delivery::QueueFull
                }
            }
        };
        match delivery {
            Delivery::Delivered => {
                debug!(session_id, text = %message.text, "status delivered");
                counter!(STATUS_DELIVERED_TOTAL).increment(1);
            }
            Delivery::NoConnection => {
                info!(session_id, text = %message.text, "no live connection for status message, dropping");
                counter!(STATUS_DROPPED_TOTAL, "reason" => "no_connection").increment(1);
            }
            Delivery::Disconnected => {
                info!(session_id, text = %message.text, "connection closed, dropping status message");
                counter!(STATUS_DROPPED_TOTAL, "reason" => "disconnected").increment(1);
            }
            Delivery::QueueFull => {
                info!(session_id, "outbound queue full, dropping status message");
                counter!(STATUS_DROPPED_TOTAL, "reason" => "queue_full").increment(1);
            }
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::extract::ws::Message;
    use chatwire_core::scoped_session;
    use tokio::sync::mpsc;

    use crate::websocket::connection::ConnectionHandle;

    fn connect(
        registry: &SessionRegistry,
        session: &str,
        capacity: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Arc::new(ConnectionHandle::new(session.into(), tx));
        let _ = registry.register(session.into(), Arc::clone(&handle));
        (handle, rx)
    }

    async fn status_text(rx: &mut mpsc::Receiver<Message>) -> String {
        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no frame")
            .expect("queue closed");
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["type"], "status");
        value["data"].as_str().unwrap().to_owned()
    }

    fn message(session: &str, text: &str) -> StatusMessage {
        StatusMessage {
            session_id: session.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn delivers_only_to_target_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (_a, mut rx_a) = connect(&registry, "a", 8);
        let (_b, mut rx_b) = connect(&registry, "b", 8);
        let broadcaster = StatusBroadcaster::new(StatusChannel::new(0), Arc::clone(&registry));

        assert_eq!(broadcaster.deliver(&message("a", "for a")), Delivery::Delivered);
        assert_eq!(status_text(&mut rx_a).await, "for a");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn unknown_session_is_dropped() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = StatusBroadcaster::new(StatusChannel::new(0), registry);
        assert_eq!(broadcaster.deliver(&message("ghost", "x")), Delivery::NoConnection);
    }

    #[test]
    fn closed_connection_is_dropped_but_kept_registered() {
        let registry = Arc::new(SessionRegistry::new());
        let (_h, rx) = connect(&registry, "s", 8);
        drop(rx);
        let broadcaster = StatusBroadcaster::new(StatusChannel::new(0), Arc::clone(&registry));
        assert_eq!(broadcaster.deliver(&message("s", "x")), Delivery::Disconnected);
        assert!(registry.lookup("s").is_some());
    }

    #[test]
    fn full_queue_drops_status() {
        let registry = Arc::new(SessionRegistry::new());
        let (handle, _rx) = connect(&registry, "s", 1);
        let broadcaster = StatusBroadcaster::new(StatusChannel::new(0), Arc::clone(&registry));
        assert_eq!(broadcaster.deliver(&message("s", "1")), Delivery::Delivered);
        assert_eq!(broadcaster.deliver(&message("s", "2")), Delivery::QueueFull);
        assert_eq!(handle.drop_count(), 1);
    }

    #[tokio::test]
    async fn run_loop_delivers_in_order_and_stops_on_shutdown() {
        let registry = Arc::new(SessionRegistry::new());
        let (_h, mut rx) = connect(&registry, "abc", 16);
        let channel = StatusChannel::new(0);
        let shutdown = CancellationToken::new();
        let task = StatusBroadcaster::new(channel.clone(), Arc::clone(&registry)).spawn(shutdown.clone());

        let producer = channel.clone();
        let _ = scoped_session("abc".into(), async move {
            for i in 0..5 {
                let _ = producer.enqueue(format!("step {i}"), None);
            }
        })
        .await;
        let _ = channel.enqueue("nobody", Some(&"other".into()));

        for i in 0..5 {
            assert_eq!(status_text(&mut rx).await, format!("step {i}"));
        }

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}

//! Inbound request queue from the relay to the runtime.
//!
//! The relay side holds a cloneable [`LiveRequestQueue`]; the runtime side
//! owns the single [`LiveRequestReceiver`]. `close()` signals that no more
//! input will arrive, which lets the runtime finish its event stream. Close
//! is idempotent so both the client→agent relay and session teardown may
//! call it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::AgentError;
use crate::types::UserContent;

enum LiveRequest {
    Content(UserContent),
    Close,
}

/// Sending half of the inbound queue.
#[derive(Clone)]
pub struct LiveRequestQueue {
    tx: mpsc::UnboundedSender<LiveRequest>,
    closed: Arc<AtomicBool>,
}

/// Receiving half of the inbound queue, owned by the runtime.
pub struct LiveRequestReceiver {
    rx: mpsc::UnboundedReceiver<LiveRequest>,
    closed: Arc<AtomicBool>,
}

impl LiveRequestQueue {
    /// Create a connected queue pair.
    pub fn channel() -> (Self, LiveRequestReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                tx,
                closed: Arc::clone(&closed),
            },
            LiveRequestReceiver { rx, closed },
        )
    }

    /// Hand one content unit to the runtime.
    pub fn send_content(&self, content: UserContent) -> Result<(), AgentError> {
        if self.is_closed() {
            return Err(AgentError::QueueClosed);
        }
        self.tx
            .send(LiveRequest::Content(content))
            .map_err(|_| AgentError::QueueClosed)
    }

    /// Signal end of input. Later calls are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closing live request queue");
            let _ = self.tx.send(LiveRequest::Close);
        }
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl LiveRequestReceiver {
    /// Next content unit, or `None` once the queue is closed or every sender
    /// has been dropped.
    pub async fn recv(&mut self) -> Option<UserContent> {
        match self.rx.recv().await? {
            LiveRequest::Content(content) => Some(content),
            LiveRequest::Close => {
                self.rx.close();
                None
            }
        }
    }

    /// Whether the sending side has called `close()`.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn delivers_in_order() {
        let (queue, mut rx) = LiveRequestQueue::channel();
        queue.send_content(UserContent::user_text("one")).unwrap();
        queue.send_content(UserContent::user_text("two")).unwrap();
        assert_eq!(rx.recv().await.unwrap().text(), "one");
        assert_eq!(rx.recv().await.unwrap().text(), "two");
    }

    #[tokio::test]
    async fn close_ends_receiver_after_pending_items() {
        let (queue, mut rx) = LiveRequestQueue::channel();
        queue.send_content(UserContent::user_text("last")).unwrap();
        queue.close();
        assert_eq!(rx.recv().await.unwrap().text(), "last");
        assert!(rx.recv().await.is_none());
        assert!(rx.recv().await.is_none());
        assert!(rx.is_closed());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (queue, _rx) = LiveRequestQueue::channel();
        queue.close();
        assert_matches!(
            queue.send_content(UserContent::user_text("late")),
            Err(AgentError::QueueClosed)
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_across_clones() {
        let (queue, mut rx) = LiveRequestQueue::channel();
        let other = queue.clone();
        queue.close();
        other.close();
        assert!(other.is_closed());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_senders_ends_receiver() {
        let (queue, mut rx) = LiveRequestQueue::channel();
        drop(queue);
        assert!(rx.recv().await.is_none());
        assert!(!rx.is_closed());
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_fails() {
        let (queue, rx) = LiveRequestQueue::channel();
        drop(rx);
        assert_matches!(
            queue.send_content(UserContent::user_text("x")),
            Err(AgentError::QueueClosed)
        );
    }
}

//! Status message channel.
//!
//! Producers anywhere in the process call [`StatusChannel::enqueue`]; a single
//! broadcaster task consumes [`StatusChannel::drain`] and routes each message
//! to the owning connection. Status messages are advisory: a message whose
//! session cannot be resolved is dropped, never reported to the producer as
//! an error.
//!
//! The queue is unbounded and `enqueue` is synchronous, so it is safe to call
//! from blocking worker threads as well as from async tasks. Items are handed
//! out in enqueue order, which gives per-session FIFO delivery for free.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::current_session;
use crate::ids::SessionId;

/// One status update addressed to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    /// Target session.
    pub session_id: SessionId,
    /// Human-readable status text.
    pub text: String,
}

struct Inner {
    tx: mpsc::UnboundedSender<StatusMessage>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StatusMessage>>,
    history: Mutex<VecDeque<StatusMessage>>,
    history_limit: usize,
}

/// Multi-producer queue of `(session, text)` pairs with a bounded replay
/// history for polling clients.
///
/// Cloning is cheap; all clones share the same queue.
#[derive(Clone)]
pub struct StatusChannel {
    inner: Arc<Inner>,
}

impl StatusChannel {
    /// Create a channel that remembers the last `history_limit` messages.
    pub fn new(history_limit: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                tx,
                rx: tokio::sync::Mutex::new(rx),
                history: Mutex::new(VecDeque::with_capacity(history_limit.min(1024))),
                history_limit,
            }),
        }
    }

    /// Enqueue `text` for `session_id`, or for the ambient session when
    /// `session_id` is `None`.
    ///
    /// Returns whether the message was accepted. An unresolvable session is
    /// an accepted loss: the message is dropped and `false` returned.
    pub fn enqueue(&self, text: impl Into<String>, session_id: Option<&SessionId>) -> bool {
        let text = text.into();
        let Some(session_id) = session_id.cloned().or_else(current_session) else {
            debug!(text = %text, "status message has no session, dropping");
            counter!("status_dropped_total", "reason" => "no_session").increment(1);
            return false;
        };
        self.push(StatusMessage { session_id, text })
    }

    /// Enqueue `text` for an explicit session.
    pub fn enqueue_for(&self, session_id: SessionId, text: impl Into<String>) -> bool {
        self.push(StatusMessage {
            session_id,
            text: text.into(),
        })
    }

    fn push(&self, message: StatusMessage) -> bool {
        if self.inner.history_limit > 0 {
            let mut history = self.inner.history.lock();
            if history.len() >= self.inner.history_limit {
                let _ = history.pop_front();
            }
            history.push_back(message.clone());
        }
        debug!(session_id = %message.session_id, text = %message.text, "status message enqueued");
        counter!("status_enqueued_total").increment(1);
        // The receiver lives in `inner` as long as any sender does.
        self.inner.tx.send(message).is_ok()
    }

    /// Lazily yield queued messages in enqueue order, suspending while empty.
    ///
    /// The stream never ends on its own. Several drains may run at once;
    /// each message is handed to exactly one of them.
    pub fn drain(&self) -> impl Stream<Item = StatusMessage> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        async_stream::stream! {
            loop {
                let next = inner.rx.lock().await.recv().await;
                match next {
                    Some(message) => yield message,
                    None => break,
                }
            }
        }
    }

    /// Recently accepted messages, oldest first, optionally for one session.
    pub fn recent(&self, session_id: Option<&str>) -> Vec<StatusMessage> {
        self.inner
            .history
            .lock()
            .iter()
            .filter(|m| session_id.is_none_or(|s| m.session_id.as_str() == s))
            .cloned()
            .collect()
    }

    /// Configured history capacity.
    pub fn history_limit(&self) -> usize {
        self.inner.history_limit
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::scoped_session;
    use futures::StreamExt;
    use std::time::Duration;

    async fn next(stream: &mut (impl Stream<Item = StatusMessage> + Unpin)) -> StatusMessage {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("status stream stalled")
            .expect("status stream ended")
    }

    #[tokio::test]
    async fn explicit_session_is_used() {
        let channel = StatusChannel::new(10);
        assert!(channel.enqueue("hello", Some(&"s1".into())));
        let mut drain = Box::pin(channel.drain());
        let msg = next(&mut drain).await;
        assert_eq!(msg.session_id.as_str(), "s1");
        assert_eq!(msg.text, "hello");
    }

    #[tokio::test]
    async fn without_session_is_dropped_silently() {
        let channel = StatusChannel::new(10);
        assert!(!channel.enqueue("lost", None));
        assert!(channel.recent(None).is_empty());
    }

    #[tokio::test]
    async fn ambient_session_round_trip() {
        let channel = StatusChannel::new(10);
        let inside = scoped_session("abc".into(), {
            let channel = channel.clone();
            async move { channel.enqueue("working", None) }
        })
        .await;
        assert!(inside);
        let after = channel.enqueue("after scope", None);
        assert!(!after);

        let mut drain = Box::pin(channel.drain());
        let msg = next(&mut drain).await;
        assert_eq!(msg.session_id.as_str(), "abc");
        assert_eq!(msg.text, "working");
    }

    #[tokio::test]
    async fn explicit_session_beats_ambient() {
        let channel = StatusChannel::new(10);
        let ch = channel.clone();
        let _ = scoped_session("ambient".into(), async move {
            ch.enqueue("x", Some(&"explicit".into()))
        })
        .await;
        assert_eq!(channel.recent(None)[0].session_id.as_str(), "explicit");
    }

    #[tokio::test]
    async fn drain_preserves_enqueue_order() {
        let channel = StatusChannel::new(0);
        for i in 0..50 {
            let session: SessionId = if i % 2 == 0 { "even".into() } else { "odd".into() };
            let _ = channel.enqueue_for(session, format!("{i}"));
        }
        let mut drain = Box::pin(channel.drain());
        let mut even = Vec::new();
        let mut odd = Vec::new();
        for _ in 0..50 {
            let msg = next(&mut drain).await;
            let n: u32 = msg.text.parse().unwrap();
            if msg.session_id.as_str() == "even" {
                even.push(n);
            } else {
                odd.push(n);
            }
        }
        assert!(even.windows(2).all(|w| w[0] < w[1]));
        assert!(odd.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn drain_suspends_until_enqueue() {
        let channel = StatusChannel::new(10);
        let mut drain = Box::pin(channel.drain());
        let pending = tokio::time::timeout(Duration::from_millis(20), drain.next()).await;
        assert!(pending.is_err());

        let producer = channel.clone();
        drop(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = producer.enqueue_for("late".into(), "arrived");
        }));
        assert_eq!(next(&mut drain).await.text, "arrived");
    }

    #[tokio::test]
    async fn enqueue_from_blocking_thread() {
        let channel = StatusChannel::new(10);
        let producer = channel.clone();
        tokio::task::spawn_blocking(move || {
            let _ = producer.enqueue_for("worker".into(), "from thread");
        })
        .await
        .unwrap();
        let mut drain = Box::pin(channel.drain());
        assert_eq!(next(&mut drain).await.session_id.as_str(), "worker");
    }

    #[tokio::test]
    async fn each_message_consumed_once() {
        let channel = StatusChannel::new(0);
        let _ = channel.enqueue_for("s".into(), "only");
        let mut first = Box::pin(channel.drain());
        let mut second = Box::pin(channel.drain());
        assert_eq!(next(&mut first).await.text, "only");
        let none = tokio::time::timeout(Duration::from_millis(20), second.next()).await;
        assert!(none.is_err());
    }

    #[test]
    fn history_is_bounded_and_filterable() {
        let channel = StatusChannel::new(3);
        for i in 0..5 {
            let session: SessionId = if i == 4 { "b".into() } else { "a".into() };
            let _ = channel.enqueue_for(session, format!("m{i}"));
        }
        let all: Vec<_> = channel.recent(None).into_iter().map(|m| m.text).collect();
        assert_eq!(all, vec!["m2", "m3", "m4"]);
        let only_a: Vec<_> = channel.recent(Some("a")).into_iter().map(|m| m.text).collect();
        assert_eq!(only_a, vec!["m2", "m3"]);
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let channel = StatusChannel::new(0);
        let _ = channel.enqueue_for("a".into(), "x");
        assert!(channel.recent(None).is_empty());
        assert_eq!(channel.history_limit(), 0);
    }
}

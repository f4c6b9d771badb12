//! Live connection handle and its single socket writer.
//!
//! The socket's sink half is owned by one writer task. Everything else
//! (the agent→client relay, the status broadcaster, session teardown) talks
//! to the client through the handle's bounded queue, so frames are never
//! interleaved mid-write and agent output keeps its emission order.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use chatwire_core::{ConnectionId, SessionId};
use futures::{Sink, SinkExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::frames::OutboundFrame;
use crate::errors::{Result, ServerError};

/// Liveness shared between a handle, its writer and the inbound reader.
pub struct LinkState {
    closed: CancellationToken,
    last_seen: Mutex<tokio::time::Instant>,
}

impl LinkState {
    fn new() -> Self {
        Self {
            closed: CancellationToken::new(),
            last_seen: Mutex::new(tokio::time::Instant::now()),
        }
    }

    /// Record client activity.
    pub fn mark_seen(&self) {
        *self.last_seen.lock() = tokio::time::Instant::now();
    }

    /// Time since the last client activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Mark the socket as gone.
    pub fn mark_closed(&self) {
        self.closed.cancel();
    }

    /// Whether the socket is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the socket is gone.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

/// The live transport endpoint for one client.
pub struct ConnectionHandle {
    id: ConnectionId,
    session_id: SessionId,
    tx: mpsc::Sender<Message>,
    link: Arc<LinkState>,
    connected_at: Instant,
    dropped_status: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle whose frames go to `tx`.
    pub fn new(session_id: SessionId, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id: ConnectionId::new(),
            session_id,
            tx,
            link: Arc::new(LinkState::new()),
            connected_at: Instant::now(),
            dropped_status: AtomicU64::new(0),
        }
    }

    /// Server-minted connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Session this connection serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Shared liveness state.
    pub fn link(&self) -> Arc<LinkState> {
        Arc::clone(&self.link)
    }

    /// Whether frames can still reach the client.
    pub fn is_connected(&self) -> bool {
        !self.link.is_closed() && !self.tx.is_closed()
    }

    /// Queue `frame`, waiting for room. Used for agent output, which must not
    /// be dropped.
    pub async fn send_frame(&self, frame: &OutboundFrame) -> Result<()> {
        if !self.is_connected() {
            return Err(ServerError::ConnectionClosed);
        }
        let text = frame.to_json()?;
        self.tx
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| ServerError::ConnectionClosed)
    }

    /// Queue `frame` without waiting. Returns `false` (and counts the drop)
    /// when the queue is full or closed.
    pub fn try_send_frame(&self, frame: &OutboundFrame) -> bool {
        let sent = frame
            .to_json()
            .ok()
            .is_some_and(|text| self.tx.try_send(Message::Text(text.into())).is_ok());
        if !sent {
            let _ = self.dropped_status.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Frames dropped by [`try_send_frame`](Self::try_send_frame).
    pub fn drop_count(&self) -> u64 {
        self.dropped_status.load(Ordering::Relaxed)
    }

    /// Ask the writer to send a normal-closure Close frame and stop.
    pub fn close(&self) {
        let frame = Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: Utf8Bytes::from_static(""),
        }));
        if self.tx.try_send(frame).is_err() {
            debug!(connection_id = %self.id, "close frame not queued");
        }
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Spawn the task that owns `sink`, forwards queued frames, sends Ping
/// frames every `ping_interval` and gives up on a client silent for
/// `pong_timeout`.
///
/// The task ends after forwarding a Close frame, when every sender is
/// dropped, on a write error or on the pong timeout. It marks `link` closed
/// on the way out.
pub fn spawn_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Message>,
    link: Arc<LinkState>,
    ping_interval: Duration,
    pong_timeout: Duration,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let closing = matches!(msg, Message::Close(_));
                    if !write_within(&mut sink, msg, pong_timeout).await || closing {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if link.idle_for() > pong_timeout {
                        warn!(timeout = ?pong_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if !write_within(&mut sink, Message::Ping(Default::default()), pong_timeout).await {
                        break;
                    }
                }
            }
        }

        link.mark_closed();
        match tokio::time::timeout(pong_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(%error, "socket close failed"),
            Err(_) => debug!("socket close stalled"),
        }
    })
}

/// Write one frame, giving up after `limit`. Returns whether it was written.
async fn write_within<S>(sink: &mut S, msg: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(error)) => {
            debug!(%error, "socket write failed");
            false
        }
        Err(_) => {
            warn!(timeout = ?limit, "socket write stalled, disconnecting");
            false
        }
    }
}

//! A runtime driven step by step from test code.
//!
//! Every `start_session` call hands a [`ScriptedSession`] to whoever holds the
//! [`ScriptedRuntime`]. The holder pushes events into the session's stream,
//! reads what the relay forwarded and can end or fail the stream at will.

use async_trait::async_trait;
use chatwire_core::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::AgentError;
use crate::queue::{LiveRequestQueue, LiveRequestReceiver};
use crate::runtime::{AgentRuntime, AgentSession};
use crate::types::{AgentEvent, RunConfig, UserContent};

/// Test-side handle on one scripted session.
pub struct ScriptedSession {
    /// Session the relay opened.
    pub session_id: SessionId,
    /// Application name the relay passed.
    pub app_name: String,
    events: Option<mpsc::UnboundedSender<Result<AgentEvent, AgentError>>>,
    requests: LiveRequestReceiver,
    queue: LiveRequestQueue,
}

impl ScriptedSession {
    /// Emit one event to the relay.
    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(Ok(event));
        }
    }

    /// Emit a stream error.
    pub fn fail(&self, message: impl Into<String>) {
        if let Some(tx) = &self.events {
            let _ = tx.send(Err(AgentError::Stream(message.into())));
        }
    }

    /// End the event stream.
    pub fn finish(&mut self) {
        self.events = None;
    }

    /// Next message the relay forwarded, or `None` once input is closed.
    pub async fn next_request(&mut self) -> Option<UserContent> {
        self.requests.recv().await
    }

    /// Whether the relay closed the inbound queue.
    pub fn input_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Runtime whose sessions are scripted by the test.
pub struct ScriptedRuntime {
    sessions: mpsc::UnboundedSender<ScriptedSession>,
    fail_starts: Mutex<u32>,
}

/// Receives the sessions a [`ScriptedRuntime`] opens.
pub struct ScriptedSessions {
    rx: mpsc::UnboundedReceiver<ScriptedSession>,
}

impl ScriptedSessions {
    /// Wait for the next session the relay opens.
    pub async fn next(&mut self) -> Option<ScriptedSession> {
        self.rx.recv().await
    }
}

impl ScriptedRuntime {
    /// Create a runtime and the receiver for its sessions.
    pub fn channel() -> (Self, ScriptedSessions) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: tx,
                fail_starts: Mutex::new(0),
            },
            ScriptedSessions { rx },
        )
    }

    /// Make the next `count` `start_session` calls fail.
    pub fn fail_next_starts(&self, count: u32) {
        *self.fail_starts.lock() = count;
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn start_session(
        &self,
        app_name: &str,
        session_id: &SessionId,
        _config: RunConfig,
    ) -> Result<AgentSession, AgentError> {
        {
            let mut remaining = self.fail_starts.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AgentError::StartFailed("scripted failure".into()));
            }
        }
        debug!(session_id = %session_id, "scripted session started");
        let (queue, requests) = LiveRequestQueue::channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        let _ = self.sessions.send(ScriptedSession {
            session_id: session_id.clone(),
            app_name: app_name.to_owned(),
            events: Some(tx),
            requests,
            queue: queue.clone(),
        });
        Ok(AgentSession::new(Box::pin(events), queue))
    }
}

//! The agent runtime capability.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use chatwire_core::SessionId;
use futures::Stream;

use crate::errors::AgentError;
use crate::queue::LiveRequestQueue;
use crate::types::{AgentEvent, RunConfig};

/// Lazy, ordered stream of runtime events for one session.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send>>;

/// The handles a runtime returns for one live session.
pub struct AgentSession {
    /// Events produced by the agent.
    pub events: AgentEventStream,
    /// Inbound user messages.
    pub requests: LiveRequestQueue,
}

impl AgentSession {
    /// Bundle an event stream with its request queue.
    pub fn new(events: AgentEventStream, requests: LiveRequestQueue) -> Self {
        Self { events, requests }
    }
}

impl fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSession")
            .field("requests_closed", &self.requests.is_closed())
            .finish_non_exhaustive()
    }
}

/// A backend that can run live agent sessions.
///
/// Implementations must end `events` once `requests` has been closed and all
/// pending input has been answered.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Open a session keyed by `session_id`.
    async fn start_session(
        &self,
        app_name: &str,
        session_id: &SessionId,
        config: RunConfig,
    ) -> Result<AgentSession, AgentError>;
}

//! A model-free runtime.
//!
//! For every user message the echo agent reports progress through the
//! `status_message` tool, answers with `Echo: <text>` and completes the turn.
//! It exists so the server can be run and tested end to end without a model
//! backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatwire_core::{EventSink, SessionId, StatusChannel};
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::queue::LiveRequestQueue;
use crate::runtime::{AgentRuntime, AgentSession};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{AgentEvent, RunConfig};

/// Echoes each user message back as one agent message.
pub struct EchoRuntime {
    tools: Arc<ToolRegistry>,
    status: StatusChannel,
    events: EventSink,
    reply_delay: Duration,
}

impl EchoRuntime {
    /// Build an echo runtime with the built-in tools.
    pub fn new(status: StatusChannel, events: EventSink) -> Self {
        Self {
            tools: Arc::new(ToolRegistry::with_builtin_tools()),
            status,
            events,
            reply_delay: Duration::ZERO,
        }
    }

    /// Pause between the status update and the reply.
    #[must_use]
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }
}

#[async_trait]
impl AgentRuntime for EchoRuntime {
    async fn start_session(
        &self,
        app_name: &str,
        session_id: &SessionId,
        config: RunConfig,
    ) -> Result<AgentSession, AgentError> {
        debug!(app_name, session_id = %session_id, modalities = ?config.response_modalities, "echo session started");
        let (requests, mut receiver) = LiveRequestQueue::channel();
        let tools = Arc::clone(&self.tools);
        let ctx = ToolContext::for_session(session_id.clone(), self.status.clone(), self.events.clone());
        let delay = self.reply_delay;

        let events = async_stream::stream! {
            while let Some(content) = receiver.recv().await {
                let text = content.text();
                if let Some(tool) = tools.get("status_message") {
                    let params = json!({ "message": format!("Thinking about: {text}") });
                    if let Err(error) = tool.execute(params, &ctx).await {
                        warn!(%error, "status tool failed");
                    }
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<_, AgentError>(AgentEvent::Message { text: format!("Echo: {text}") });
                yield Ok(AgentEvent::TurnComplete);
            }
        };
        Ok(AgentSession::new(Box::pin(events), requests))
    }
}

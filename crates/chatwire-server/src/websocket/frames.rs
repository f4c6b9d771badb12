//! Outbound JSON frames.
//!
//! Every frame is a JSON object with a `type` discriminator:
//!
//! ```text
//! {"type":"agent_message","message":"..."}
//! {"type":"agent_turn_complete","turn_complete":true}
//! {"type":"agent_interrupted","interrupted":true}
//! {"type":"status","data":"..."}
//! {"type":"server_log","level":"INFO","message":"[abc] ..."}
//! ```

use chatwire_runtime::AgentEvent;
use serde::Serialize;

/// Severity carried by `server_log` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Recoverable problem.
    Warn,
    /// Failure.
    Error,
}

/// A frame sent from the server to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// One chunk of agent output.
    AgentMessage {
        /// Output text.
        message: String,
    },
    /// The agent finished its turn.
    AgentTurnComplete {
        /// Always `true`.
        turn_complete: bool,
    },
    /// The agent's turn was interrupted.
    AgentInterrupted {
        /// Always `true`.
        interrupted: bool,
    },
    /// Out-of-band status update.
    Status {
        /// Status text.
        data: String,
    },
    /// Server-side diagnostic for this session.
    ServerLog {
        /// Severity.
        level: LogLevel,
        /// Message prefixed with the session id.
        message: String,
    },
}

impl OutboundFrame {
    /// Status frame for `text`.
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status { data: text.into() }
    }

    /// Encode as a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<AgentEvent> for OutboundFrame {
    fn from(event: AgentEvent) -> Self {
        match event {
            AgentEvent::TurnComplete => Self::AgentTurnComplete { turn_complete: true },
            AgentEvent::Interrupted => Self::AgentInterrupted { interrupted: true },
            AgentEvent::Message { text } => Self::AgentMessage { message: text },
        }
    }
}

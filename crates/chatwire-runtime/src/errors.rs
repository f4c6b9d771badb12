//! Runtime and tool error types.

use thiserror::Error;

/// Failures reported by an agent runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The backend could not open a session.
    #[error("failed to start agent session: {0}")]
    StartFailed(String),
    /// Input was sent after the request queue was closed.
    #[error("live request queue is closed")]
    QueueClosed,
    /// The event stream failed mid-flight.
    #[error("agent stream error: {0}")]
    Stream(String),
}

/// Failures reported by a tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
    /// No session id could be resolved for the call.
    #[error("no session bound to this tool call")]
    NoSession,
    /// Anything else.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

//! Server error types.

use thiserror::Error;

/// Errors surfaced by the server crate.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The connection's outbound queue is gone.
    #[error("connection closed")]
    ConnectionClosed,
    /// A frame could not be encoded.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ServerError>;

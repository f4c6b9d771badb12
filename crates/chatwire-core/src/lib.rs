//! # chatwire-core
//!
//! Shared building blocks for the chat relay:
//!
//! - [`ids`] — `SessionId` / `ConnectionId` newtypes
//! - [`context`] — task-scoped ambient session binding ([`scoped_session`])
//! - [`status`] — the process-wide [`StatusChannel`] of `(session, text)` pairs
//! - [`events`] — fire-and-forget [`EventSink`] for categorized JSON payloads
//! - [`logging`] — `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod context;
pub mod events;
pub mod ids;
pub mod logging;
pub mod status;

pub use context::{current_session, scoped_session, spawn_in_session};
pub use events::{EventSink, PublishedEvent};
pub use ids::{ConnectionId, SessionId};
pub use status::{StatusChannel, StatusMessage};

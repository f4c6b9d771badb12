//! # chatwire-runtime
//!
//! The agent runtime as seen from the relay: an opaque capability that,
//! given a [`LiveRequestQueue`] of user messages, produces a lazy, ordered
//! stream of [`AgentEvent`]s.
//!
//! - [`runtime`] — the [`AgentRuntime`] trait and [`AgentSession`]
//! - [`queue`] — the inbound [`LiveRequestQueue`] with `close()`
//! - [`types`] — [`AgentEvent`], [`UserContent`], [`RunConfig`]
//! - [`tools`] — the tool contract and the built-in status tools
//! - [`echo`] — a model-free runtime used by the binary and tests
//! - `scripted` — a runtime driven step by step from test code (feature
//!   `test-support`)

#![deny(unsafe_code)]

pub mod echo;
pub mod errors;
pub mod queue;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod tools;
pub mod types;

pub use echo::EchoRuntime;
pub use errors::{AgentError, ToolError};
pub use queue::{LiveRequestQueue, LiveRequestReceiver};
pub use runtime::{AgentEventStream, AgentRuntime, AgentSession};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{ScriptedRuntime, ScriptedSession, ScriptedSessions};
pub use tools::{SessionIdTool, StatusMessageTool, Tool, ToolContext, ToolRegistry};
pub use types::{AgentEvent, Modality, Part, RunConfig, UserContent};

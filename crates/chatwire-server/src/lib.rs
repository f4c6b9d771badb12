//! # chatwire-server
//!
//! Axum HTTP + `WebSocket` relay between browser chat clients and an agent
//! runtime.
//!
//! - `/ws/{session_id}`: one [`ConnectionSession`](websocket::session::ConnectionSession)
//!   per socket, relaying client text to the agent and agent events back
//! - [`SessionRegistry`](websocket::registry::SessionRegistry): live
//!   connection per session id, last writer wins
//! - [`StatusBroadcaster`](broadcaster::StatusBroadcaster): routes status
//!   messages from tool code to the owning connection
//! - HTTP endpoints: index, static assets, health, metrics, status history,
//!   simulated background work
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod broadcaster;
pub mod config;
pub mod errors;
pub mod event_log;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod simulate;
pub mod websocket;

//! `WebSocket` gateway: per-connection relay, handles and registry.

pub mod connection;
pub mod frames;
pub mod registry;
pub mod session;

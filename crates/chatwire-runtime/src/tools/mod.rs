//! Tool contract and registry.
//!
//! Tools are invoked by the agent runtime while it is producing events for a
//! session. A tool resolves the session it acts for from, in order: an
//! explicit `session_id` parameter, [`ToolContext::session_id`], and finally
//! the ambient session bound around the relay.

mod session;
mod status;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatwire_core::{EventSink, SessionId, StatusChannel, current_session};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ToolError;

pub use session::SessionIdTool;
pub use status::StatusMessageTool;

// ─────────────────────────────────────────────────────────────────────────────
// Tool context
// ─────────────────────────────────────────────────────────────────────────────

/// Execution context passed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    /// Unique ID of this tool call.
    pub tool_call_id: String,
    /// Session the runtime is serving, when it knows it.
    pub session_id: Option<SessionId>,
    /// Shared status queue.
    pub status: StatusChannel,
    /// Fire-and-forget event publishing.
    pub events: EventSink,
}

impl ToolContext {
    /// Context for a call on behalf of `session_id`.
    pub fn for_session(session_id: SessionId, status: StatusChannel, events: EventSink) -> Self {
        Self {
            tool_call_id: new_call_id(),
            session_id: Some(session_id),
            status,
            events,
        }
    }

    /// Context with no explicit session; tools fall back to the ambient one.
    pub fn ambient(status: StatusChannel, events: EventSink) -> Self {
        Self {
            tool_call_id: new_call_id(),
            session_id: None,
            status,
            events,
        }
    }

    /// Session for this call: `explicit`, then the context, then ambient.
    pub fn resolve_session(&self, explicit: Option<&str>) -> Option<SessionId> {
        explicit
            .filter(|s| !s.is_empty())
            .map(SessionId::from)
            .or_else(|| self.session_id.clone())
            .or_else(current_session)
    }
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::now_v7())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────────────────────────────────────

/// A named capability the agent can call with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as seen by the model.
    fn name(&self) -> &str;

    /// One-line description for the model.
    fn description(&self) -> &str;

    /// Execute the tool.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Maps tool names to implementations.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `status_message` and `get_session_id`.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StatusMessageTool));
        registry.register(Arc::new(SessionIdTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool_name = tool.name(), "tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Tool, ToolContext};
use crate::errors::ToolError;

/// Reports the session id the current call is acting for.
pub struct SessionIdTool;

#[async_trait]
impl Tool for SessionIdTool {
    fn name(&self) -> &str {
        "get_session_id"
    }

    fn description(&self) -> &str {
        "Return the id of the current chat session."
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let session_id = ctx.resolve_session(None).ok_or(ToolError::NoSession)?;
        Ok(json!({ "session_id": session_id }))
    }
}

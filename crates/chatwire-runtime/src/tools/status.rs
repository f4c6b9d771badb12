use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolContext};
use crate::errors::ToolError;

/// Pushes a progress message to the user's status area.
///
/// A missing session is not an error: the message is dropped and the result
/// reports `queued: false`.
pub struct StatusMessageTool;

#[async_trait]
impl Tool for StatusMessageTool {
    fn name(&self) -> &str {
        "status_message"
    }

    fn description(&self) -> &str {
        "Show a short progress message in the user's status area."
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ToolError::Validation {
                message: "message is required".into(),
            })?;
        let explicit = params.get("session_id").and_then(Value::as_str);

        let queued = match ctx.resolve_session(explicit) {
            Some(session_id) => {
                debug!(tool_call_id = %ctx.tool_call_id, session_id = %session_id, "status_message");
                ctx.events.publish(
                    "status_message",
                    json!({ "sessionId": session_id, "message": message }),
                );
                ctx.status.enqueue_for(session_id, message)
            }
            None => ctx.status.enqueue(message, None),
        };
        Ok(json!({ "queued": queued }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chatwire_core::{EventSink, StatusChannel, scoped_session};

    fn ctx() -> ToolContext {
        ToolContext::ambient(StatusChannel::new(10), EventSink::default())
    }

    #[tokio::test]
    async fn explicit_session_param() {
        let ctx = ctx();
        let out = StatusMessageTool
            .execute(json!({"message": "hi", "session_id": "s1"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out["queued"], true);
        let recent = ctx.status.recent(Some("s1"));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "hi");
    }

    #[tokio::test]
    async fn ambient_session_used_when_absent() {
        let ctx = ctx();
        let out = scoped_session("abc".into(), StatusMessageTool.execute(json!({"message": "working"}), &ctx))
            .await
            .unwrap();
        assert_eq!(out["queued"], true);
        assert_eq!(ctx.status.recent(Some("abc"))[0].text, "working");
    }

    #[tokio::test]
    async fn no_session_is_not_an_error() {
        let ctx = ctx();
        let out = StatusMessageTool
            .execute(json!({"message": "lost"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out["queued"], false);
        assert!(ctx.status.recent(None).is_empty());
    }

    #[tokio::test]
    async fn missing_message_is_rejected() {
        let err = StatusMessageTool.execute(json!({}), &ctx()).await.unwrap_err();
        assert_matches!(err, ToolError::Validation { .. });
        let err = StatusMessageTool
            .execute(json!({"message": "  "}), &ctx())
            .await
            .unwrap_err();
        assert_matches!(err, ToolError::Validation { .. });
    }

    #[tokio::test]
    async fn publishes_event() {
        let ctx = ctx();
        let mut events = ctx.events.subscribe();
        let _ = StatusMessageTool
            .execute(json!({"message": "m", "session_id": "s"}), &ctx)
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.category, "status_message");
        assert_eq!(event.payload["sessionId"], "s");
    }
}

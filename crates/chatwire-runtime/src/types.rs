//! Messages exchanged with the agent runtime.

use serde::{Deserialize, Serialize};

/// Role tag for content produced by the connected user.
pub const USER_ROLE: &str = "user";

/// One piece of a content unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// A role-tagged content unit handed to the runtime's inbound queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContent {
    /// Author role (`"user"` for client input).
    pub role: String,
    /// Ordered parts.
    pub parts: Vec<Part>,
}

impl UserContent {
    /// Wrap one client chat message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: USER_ROLE.to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// Concatenated text of all parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|Part::Text { text }| text.as_str())
            .collect()
    }
}

/// Events produced by the runtime, in emission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentEvent {
    /// The agent finished its turn.
    TurnComplete,
    /// The agent's turn was interrupted.
    Interrupted,
    /// One chunk of agent output.
    Message {
        /// Output text.
        text: String,
    },
}

impl AgentEvent {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TurnComplete => "turn_complete",
            Self::Interrupted => "interrupted",
            Self::Message { .. } => "message",
        }
    }
}

/// Output modality requested from the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Text responses.
    Text,
    /// Audio responses.
    Audio,
}

/// Per-session runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Requested response modalities.
    pub response_modalities: Vec<Modality>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            response_modalities: vec![Modality::Text],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_text_has_user_role() {
        let content = UserContent::user_text("hello");
        assert_eq!(content.role, "user");
        assert_eq!(content.parts, vec![Part::Text { text: "hello".into() }]);
        assert_eq!(content.text(), "hello");
    }

    #[test]
    fn text_joins_parts() {
        let content = UserContent {
            role: USER_ROLE.into(),
            parts: vec![
                Part::Text { text: "a".into() },
                Part::Text { text: "b".into() },
            ],
        };
        assert_eq!(content.text(), "ab");
    }

    #[test]
    fn default_run_config_is_text_only() {
        let config = RunConfig::default();
        assert_eq!(config.response_modalities, vec![Modality::Text]);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["responseModalities"], serde_json::json!(["TEXT"]));
    }

    #[test]
    fn event_kinds() {
        assert_eq!(AgentEvent::TurnComplete.kind(), "turn_complete");
        assert_eq!(AgentEvent::Interrupted.kind(), "interrupted");
        assert_eq!(AgentEvent::Message { text: String::new() }.kind(), "message");
    }
}

//! Conversation turns and completion request/response types.
//!
//! [`ChatMessage`] is used both for the prompts the router sends to a
//! completion provider and for the conversation history callers pass to
//! [`Orchestrator::process_user_request`](super::Orchestrator::process_user_request).
//! History files on disk are a JSON array of `{"role", "content"}` objects.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Routing or answering instructions.
    System,
    /// The end user.
    User,
    /// A previous assistant reply.
    Assistant,
}

impl Role {
    /// Lowercase tag, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a turn for `role`.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A completion request, independent of any SDK.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model name, e.g. the classifier or synthesizer model from config.
    pub model: String,
    /// Prompt turns in order.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; `None` leaves the provider default.
    pub temperature: Option<f32>,
    /// Completion token cap.
    pub max_tokens: Option<u32>,
    /// Ask for a JSON object reply (classifier, planner, evaluator).
    pub json_mode: bool,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub prompt_tokens: u32,
    /// Completion tokens.
    pub completion_tokens: u32,
    /// Sum of both.
    pub total_tokens: u32,
}

/// A completion reply.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Reply text; empty when the model produced nothing.
    pub content: String,
    /// Token accounting.
    pub usage: TokenUsage,
    /// Provider stop reason such as `"stop"` or `"length"`.
    pub finish_reason: Option<String>,
}

/// System turn.
#[must_use]
pub fn system_message(content: impl Into<String>) -> ChatMessage {
    ChatMessage::new(Role::System, content)
}

/// User turn.
#[must_use]
pub fn user_message(content: impl Into<String>) -> ChatMessage {
    ChatMessage::new(Role::User, content)
}

/// Assistant turn.
#[must_use]
pub fn assistant_message(content: impl Into<String>) -> ChatMessage {
    ChatMessage::new(Role::Assistant, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_tag_matches_serialized_form() {
        for role in [Role::System, Role::User, Role::Assistant] {
            let json = serde_json::to_string(&role).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }

    #[test]
    fn test_history_file_format() {
        let raw = r#"[{"role":"user","content":"show my emails"},
                      {"role":"assistant","content":"You have 3 new emails."}]"#;
        let history: Vec<ChatMessage> = serde_json::from_str(raw).unwrap_or_default();
        assert_eq!(
            history,
            vec![
                user_message("show my emails"),
                assistant_message("You have 3 new emails."),
            ]
        );
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let raw = r#"[{"role":"tool","content":"{}"}]"#;
        assert!(serde_json::from_str::<Vec<ChatMessage>>(raw).is_err());
    }
}

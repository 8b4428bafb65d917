use std::fmt;

use murmur_stream::ConversationId;
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
    #[serde(other)]
    Unknown,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
            Self::System => "SYSTEM",
            Self::Tool => "TOOL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One stored message as the backend reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub chat_id: Option<ConversationId>,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ConversationId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message_count: Option<u64>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatSummary {
    /// Message count from the backend, or the embedded messages when it omits one.
    pub fn message_count(&self) -> u64 {
        self.message_count.unwrap_or(self.messages.len() as u64)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateChatRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: ConversationId,
    pub role: MessageRole,
    pub content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_summary_reads_camel_case_payload() {
        let chat: ChatSummary = serde_json::from_str(
            r#"{"id":4,"title":"Rust","createdAt":"2024-05-01T10:00:00","messageCount":2}"#,
        )
        .expect("chat payload should decode");

        assert_eq!(chat.id, ConversationId::new(4));
        assert_eq!(chat.title, "Rust");
        assert_eq!(chat.created_at.as_deref(), Some("2024-05-01T10:00:00"));
        assert_eq!(chat.message_count(), 2);
    }

    #[test]
    fn message_count_falls_back_to_embedded_messages() {
        let chat: ChatSummary = serde_json::from_str(
            r#"{"id":1,"title":"t","messages":[{"role":"USER","content":"hi"}]}"#,
        )
        .expect("chat payload should decode");

        assert_eq!(chat.message_count(), 1);
        assert_eq!(chat.messages[0].role, MessageRole::User);
    }

    #[test]
    fn unknown_roles_are_tolerated() {
        let message: ChatMessage =
            serde_json::from_str(r#"{"id":9,"chatId":3,"role":"NARRATOR","content":"x"}"#)
                .expect("message payload should decode");

        assert_eq!(message.role, MessageRole::Unknown);
        assert_eq!(message.chat_id, Some(ConversationId::new(3)));
    }

    #[test]
    fn send_request_uses_backend_field_names() {
        let body = serde_json::to_value(SendMessageRequest {
            chat_id: ConversationId::new(12),
            role: MessageRole::User,
            content: "hello",
        })
        .expect("request should serialize");

        assert_eq!(
            body,
            serde_json::json!({"chatId": 12, "role": "USER", "content": "hello"})
        );
    }
}

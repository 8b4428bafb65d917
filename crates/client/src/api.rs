use murmur_stream::ConversationId;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientResult, DecodeSnafu, InvalidTitleSnafu, RequestSnafu, StatusSnafu};
use crate::transport::HttpTransport;
use crate::types::{
    ChatMessage, ChatSummary, CreateChatRequest, MAX_TITLE_CHARS, MessageRole, SendMessageRequest,
};

const CHATS_PATH: &str = "/api/chats";
const MESSAGES_PATH: &str = "/api/messages";
const STREAM_STATUS_PATH: &str = "/api/stream/status";

/// Checks a chat title the way the backend does and returns it trimmed.
pub fn validate_title(title: &str) -> ClientResult<&str> {
    let title = title.trim();
    ensure!(
        !title.is_empty(),
        InvalidTitleSnafu {
            stage: "validate-title",
            reason: "title must not be blank",
        }
    );
    ensure!(
        title.chars().count() <= MAX_TITLE_CHARS,
        InvalidTitleSnafu {
            stage: "validate-title",
            reason: "title must be at most 255 characters",
        }
    );
    Ok(title)
}

/// Plain request/response calls against the chat backend.
#[derive(Clone, Debug)]
pub struct ChatApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ChatApi {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Streaming transport sharing this api's connection pool.
    pub fn transport(&self) -> HttpTransport {
        HttpTransport::from_parts(self.client.clone(), self.config.clone())
    }

    pub async fn list_chats(&self) -> ClientResult<Vec<ChatSummary>> {
        self.get_json("list-chats", CHATS_PATH).await
    }

    pub async fn create_chat(&self, title: &str) -> ClientResult<ChatSummary> {
        let title = validate_title(title)?;
        let url = self.config.endpoint(CHATS_PATH);
        let response = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(&CreateChatRequest { title })
            .send()
            .await
            .context(RequestSnafu {
                stage: "create-chat",
                url: url.as_str(),
            })?;
        let response = ensure_success(response, &url, "create-chat").await?;
        let chat: ChatSummary = decode(response, &url, "create-chat").await?;
        info!(chat_id = %chat.id, title = %chat.title, "created chat");
        Ok(chat)
    }

    /// `None` when the backend does not know the chat.
    pub async fn get_chat(&self, id: ConversationId) -> ClientResult<Option<ChatSummary>> {
        let url = self.config.endpoint(&format!("{CHATS_PATH}/{id}"));
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .context(RequestSnafu {
                stage: "get-chat",
                url: url.as_str(),
            })?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(chat_id = %id, "chat not found");
            return Ok(None);
        }
        let response = ensure_success(response, &url, "get-chat").await?;
        decode(response, &url, "get-chat").await.map(Some)
    }

    /// Returns whether a chat was deleted; an unknown chat yields `false`.
    pub async fn delete_chat(&self, id: ConversationId) -> ClientResult<bool> {
        let url = self.config.endpoint(&format!("{CHATS_PATH}/{id}"));
        let response = self
            .client
            .delete(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .context(RequestSnafu {
                stage: "delete-chat",
                url: url.as_str(),
            })?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(chat_id = %id, "chat to delete not found");
            return Ok(false);
        }
        ensure_success(response, &url, "delete-chat").await?;
        info!(chat_id = %id, "deleted chat");
        Ok(true)
    }

    pub async fn list_messages(&self, chat_id: ConversationId) -> ClientResult<Vec<ChatMessage>> {
        self.get_json("list-messages", &format!("{MESSAGES_PATH}/chat/{chat_id}"))
            .await
    }

    /// Non-streaming send; the backend answers with the stored assistant reply.
    pub async fn send_message(
        &self,
        chat_id: ConversationId,
        text: &str,
    ) -> ClientResult<ChatMessage> {
        let url = self.config.endpoint(MESSAGES_PATH);
        let response = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(&SendMessageRequest {
                chat_id,
                role: MessageRole::User,
                content: text.trim(),
            })
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-message",
                url: url.as_str(),
            })?;
        let response = ensure_success(response, &url, "send-message").await?;
        decode(response, &url, "send-message").await
    }

    pub async fn stream_status(&self) -> ClientResult<String> {
        let url = self.config.endpoint(STREAM_STATUS_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .context(RequestSnafu {
                stage: "stream-status",
                url: url.as_str(),
            })?;
        let response = ensure_success(response, &url, "stream-status").await?;
        response.text().await.context(DecodeSnafu {
            stage: "stream-status",
            url: url.as_str(),
        })
    }

    async fn get_json<T>(&self, stage: &'static str, path: &str) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .context(RequestSnafu {
                stage,
                url: url.as_str(),
            })?;
        let response = ensure_success(response, &url, stage).await?;
        decode(response, &url, stage).await
    }
}

async fn ensure_success(
    response: reqwest::Response,
    url: &str,
    stage: &'static str,
) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    StatusSnafu {
        stage,
        url,
        status: status.as_u16(),
        body,
    }
    .fail()
}

async fn decode<T>(response: reqwest::Response, url: &str, stage: &'static str) -> ClientResult<T>
where
    T: DeserializeOwned,
{
    response.json().await.context(DecodeSnafu { stage, url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn titles_are_trimmed() {
        assert_eq!(validate_title("  Rust questions \n").unwrap(), "Rust questions");
    }

    #[test]
    fn blank_titles_are_rejected() {
        let error = validate_title(" \t ").expect_err("blank title");
        assert!(matches!(error, ClientError::InvalidTitle { .. }));
    }

    #[test]
    fn title_length_counts_characters() {
        let at_limit = "é".repeat(MAX_TITLE_CHARS);
        assert!(validate_title(&at_limit).is_ok());

        let over_limit = "a".repeat(MAX_TITLE_CHARS + 1);
        let error = validate_title(&over_limit).expect_err("too long");
        assert!(matches!(error, ClientError::InvalidTitle { .. }));
    }
}

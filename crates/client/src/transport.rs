use futures::StreamExt;
use murmur_stream::error::{InterruptedSnafu, RejectedSnafu, RequestSnafu};
use murmur_stream::{BoxFuture, ChatTransport, ChunkStream, ConversationId, TransportError};
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::types::{MessageRole, SendMessageRequest};

pub const STREAM_PATH: &str = "/api/stream/messages";
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Streams assistant answers from the backend's server-sent event endpoint.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = config.http_client()?;
        Ok(Self::from_parts(client, config))
    }

    pub(crate) fn from_parts(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    async fn open_stream(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<ChunkStream, TransportError> {
        let url = self.config.endpoint(STREAM_PATH);
        debug!(%conversation_id, %url, "opening answer stream");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, EVENT_STREAM_MIME)
            .json(&SendMessageRequest {
                chat_id: conversation_id,
                role: MessageRole::User,
                content: text,
            })
            .send()
            .await
            .map_err(|error| {
                RequestSnafu {
                    stage: "open-stream",
                    message: error.to_string(),
                }
                .build()
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return RejectedSnafu {
                stage: "open-stream",
                status: Some(status.as_u16()),
                body,
            }
            .fail();
        }

        let chunks = response.bytes_stream().map(|chunk| {
            chunk.map_err(|error| {
                InterruptedSnafu {
                    stage: "read-stream",
                    message: error.to_string(),
                }
                .build()
            })
        });
        Ok(ChunkStream::new(chunks))
    }
}

impl ChatTransport for HttpTransport {
    fn open<'a>(
        &'a self,
        conversation_id: ConversationId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, TransportError>> {
        Box::pin(self.open_stream(conversation_id, text))
    }
}

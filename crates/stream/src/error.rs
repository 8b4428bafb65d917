use std::time::Duration;

use snafu::Snafu;

use crate::frame::LineTooLong;
use crate::ids::ConversationId;
use crate::render::DetachedSink;

/// Failure reported by a [`ChatTransport`](crate::ChatTransport) implementation.
///
/// Context selectors are public so transports living in other crates can build these.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    #[snafu(display("request rejected on `{stage}` with status {status:?}: {body}"))]
    Rejected {
        stage: &'static str,
        status: Option<u16>,
        body: String,
    },
    #[snafu(display("request could not be sent on `{stage}`: {message}"))]
    Request {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("stream interrupted on `{stage}`: {message}"))]
    Interrupted {
        stage: &'static str,
        message: String,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("no active conversation is bound on `{stage}`"))]
    NoActiveConversation { stage: &'static str },
    #[snafu(display("message for conversation {conversation_id} is empty"))]
    EmptyMessage {
        stage: &'static str,
        conversation_id: ConversationId,
    },
    #[snafu(display(
        "stream for conversation {conversation_id} was rejected on `{stage}`, {source}"
    ))]
    TransportRejected {
        stage: &'static str,
        conversation_id: ConversationId,
        source: TransportError,
    },
    #[snafu(display(
        "stream for conversation {conversation_id} was interrupted on `{stage}`, {source}"
    ))]
    TransportInterrupted {
        stage: &'static str,
        conversation_id: ConversationId,
        source: TransportError,
    },
    #[snafu(display(
        "stream for conversation {conversation_id} was idle for longer than {timeout:?}"
    ))]
    IdleTimeout {
        stage: &'static str,
        conversation_id: ConversationId,
        timeout: Duration,
    },
    #[snafu(display(
        "stream for conversation {conversation_id} sent an oversized line, {source}"
    ))]
    LineTooLong {
        stage: &'static str,
        conversation_id: ConversationId,
        source: LineTooLong,
    },
    #[snafu(display("render sink for conversation {conversation_id} was detached, {source}"))]
    SinkDetached {
        stage: &'static str,
        conversation_id: ConversationId,
        source: DetachedSink,
    },
}

impl SessionError {
    /// True for errors raised before any network activity; nothing was mutated.
    pub fn is_rejected_before_open(&self) -> bool {
        matches!(
            self,
            Self::NoActiveConversation { .. } | Self::EmptyMessage { .. }
        )
    }

    /// True when the stream itself failed after it was opened.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            Self::TransportInterrupted { .. }
                | Self::IdleTimeout { .. }
                | Self::LineTooLong { .. }
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

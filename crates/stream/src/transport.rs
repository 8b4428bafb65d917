use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::TransportError;
use crate::ids::ConversationId;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type BoxChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Ordered chunks of one long-lived response body.
pub struct ChunkStream {
    inner: BoxChunkStream,
}

impl ChunkStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Next chunk; `None` is an orderly end of stream.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        self.inner.next().await
    }

    /// Stops reading and releases the underlying connection.
    pub fn abort(self) {
        drop(self.inner);
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ChunkStream").finish_non_exhaustive()
    }
}

/// Opens the streaming response for one submitted message.
pub trait ChatTransport: Send + Sync {
    fn open<'a>(
        &'a self,
        conversation_id: ConversationId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<ChunkStream, TransportError>>;
}

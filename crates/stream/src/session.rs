use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use snafu::{OptionExt, ResultExt, ensure};
use tokio::sync::{oneshot, watch};

use crate::error::{
    EmptyMessageSnafu, LineTooLongSnafu, NoActiveConversationSnafu, SessionError, SessionResult,
    SinkDetachedSnafu, TransportError,
};
use crate::event::classify;
use crate::frame::{DEFAULT_MAX_LINE_LEN, FrameSplitter};
use crate::ids::ConversationId;
use crate::record::extract_record;
use crate::render::{IncrementalRenderer, SinkHandle};
use crate::transport::{ChatTransport, ChunkStream};

pub const DEFAULT_FAILURE_STATUS: &str = "error receiving response";

pub type SessionWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Longest gap allowed between two chunks; elapsing fails the session.
    pub idle_timeout: Option<Duration>,
    /// Status written to the sink when the stream fails.
    pub failure_status: String,
    /// Longest line the stream may send before it is treated as broken.
    pub max_line_len: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            failure_status: DEFAULT_FAILURE_STATUS.to_string(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl SessionOptions {
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn with_failure_status(mut self, failure_status: impl Into<String>) -> Self {
        self.failure_status = failure_status.into();
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }
}

/// Lifecycle of one request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Opening,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// Rejection for a transition the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Applies one transition deterministically.
    ///
    /// Terminal states accept nothing; cancellation is accepted from every other state.
    pub fn advance(self, next: SessionState) -> Result<SessionState, IllegalTransition> {
        let allowed = match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Self::Cancelled) => true,
            (Self::Idle, Self::Opening)
            | (Self::Opening, Self::Streaming)
            | (Self::Opening, Self::Failed)
            | (Self::Streaming, Self::Completed)
            | (Self::Streaming, Self::Failed) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Value carried by the completion signal.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed,
    Failed(SessionError),
    Cancelled,
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed => SessionState::Completed,
            Self::Failed(_) => SessionState::Failed,
            Self::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Completion signal of one session; resolves exactly once.
#[derive(Debug)]
pub struct Completion {
    outcome_rx: oneshot::Receiver<SessionOutcome>,
}

impl Completion {
    /// Waits for the terminal outcome. A worker dropped before finishing counts as cancelled.
    pub async fn wait(self) -> SessionOutcome {
        self.outcome_rx.await.unwrap_or(SessionOutcome::Cancelled)
    }
}

/// Cancels its session when asked or when dropped.
#[derive(Debug)]
pub struct CancelHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Everything the UI needs for one started session.
///
/// `worker` drives the stream and must be spawned by the caller.
pub struct SessionHandle {
    pub conversation_id: ConversationId,
    pub sink: SinkHandle,
    pub state: watch::Receiver<SessionState>,
    pub completion: Completion,
    pub cancel: CancelHandle,
    pub worker: SessionWorker,
}

/// One message submission bound to at most one conversation.
pub struct StreamSession {
    transport: Arc<dyn ChatTransport>,
    conversation_id: Option<ConversationId>,
    options: SessionOptions,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        conversation_id: Option<ConversationId>,
    ) -> Self {
        Self {
            transport,
            conversation_id,
            options: SessionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the submission and prepares the stream worker.
    ///
    /// Nothing touches the transport until the returned worker is polled.
    pub fn start(self, text: impl Into<String>) -> SessionResult<SessionHandle> {
        let conversation_id = self.conversation_id.context(NoActiveConversationSnafu {
            stage: "session-start",
        })?;

        let text = text.into().trim().to_string();
        ensure!(
            !text.is_empty(),
            EmptyMessageSnafu {
                stage: "session-start",
                conversation_id,
            }
        );

        let (renderer, sink) = IncrementalRenderer::new();
        let (state_tx, state) = watch::channel(SessionState::Idle);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let driver = SessionDriver {
            transport: self.transport,
            conversation_id,
            text,
            splitter: FrameSplitter::with_max_line_len(self.options.max_line_len),
            options: self.options,
            renderer,
            state_tx,
            outcome_tx: Some(outcome_tx),
        };

        Ok(SessionHandle {
            conversation_id,
            sink,
            state,
            completion: Completion { outcome_rx },
            cancel: CancelHandle {
                cancel_tx: Some(cancel_tx),
            },
            worker: Box::pin(driver.run(cancel_rx)),
        })
    }
}

enum ReadStep {
    Chunk(Bytes),
    End,
    Failed(TransportError),
    Idle(Duration),
    Cancelled,
}

struct SessionDriver {
    transport: Arc<dyn ChatTransport>,
    conversation_id: ConversationId,
    text: String,
    options: SessionOptions,
    renderer: IncrementalRenderer,
    splitter: FrameSplitter,
    state_tx: watch::Sender<SessionState>,
    outcome_tx: Option<oneshot::Sender<SessionOutcome>>,
}

impl SessionDriver {
    async fn run(mut self, mut cancel_rx: oneshot::Receiver<()>) {
        let conversation_id = self.conversation_id;
        self.transition(SessionState::Opening);
        tracing::debug!(%conversation_id, text_len = self.text.len(), "opening response stream");

        let transport = Arc::clone(&self.transport);
        let opened = tokio::select! {
            biased;
            _ = &mut cancel_rx => None,
            opened = transport.open(conversation_id, &self.text) => Some(opened),
        };

        let mut stream = match opened {
            None => return self.finish_cancelled(None),
            Some(Ok(stream)) => stream,
            Some(Err(source)) => {
                tracing::warn!(%conversation_id, error = %source, "response stream rejected");
                return self.finish_failed(SessionError::TransportRejected {
                    stage: "session-open",
                    conversation_id,
                    source,
                });
            }
        };

        self.transition(SessionState::Streaming);

        loop {
            // Cancellation wins over a chunk that is already waiting.
            let step = tokio::select! {
                biased;
                _ = &mut cancel_rx => ReadStep::Cancelled,
                step = read_step(&mut stream, self.options.idle_timeout) => step,
            };

            match step {
                ReadStep::Chunk(chunk) => {
                    if let Err(error) = self.process_chunk(&chunk) {
                        return self.finish_failed(error);
                    }
                }
                ReadStep::End => return self.finish_completed(),
                ReadStep::Failed(source) => {
                    tracing::warn!(
                        %conversation_id,
                        error = %source,
                        "response stream interrupted"
                    );
                    return self.finish_failed(SessionError::TransportInterrupted {
                        stage: "session-read-chunk",
                        conversation_id,
                        source,
                    });
                }
                ReadStep::Idle(timeout) => {
                    tracing::warn!(%conversation_id, ?timeout, "response stream idle timeout");
                    return self.finish_failed(SessionError::IdleTimeout {
                        stage: "session-read-chunk",
                        conversation_id,
                        timeout,
                    });
                }
                ReadStep::Cancelled => return self.finish_cancelled(Some(stream)),
            }
        }
    }

    fn process_chunk(&mut self, chunk: &[u8]) -> SessionResult<()> {
        let conversation_id = self.conversation_id;
        let events = self
            .splitter
            .feed(chunk)
            .context(LineTooLongSnafu {
                stage: "session-split-chunk",
                conversation_id,
            })?
            .iter()
            .filter_map(|line| extract_record(line))
            .map(classify)
            .collect::<Vec<_>>();

        tracing::trace!(
            conversation_id = %self.conversation_id,
            chunk_len = chunk.len(),
            event_count = events.len(),
            pending_len = self.splitter.pending_len(),
            "decoded chunk"
        );

        self.renderer
            .apply_batch(&events)
            .context(SinkDetachedSnafu {
                stage: "session-render-chunk",
                conversation_id,
            })
    }

    fn finish_completed(mut self) {
        if let Some(line) = self.splitter.flush() {
            match extract_record(&line) {
                Some(record) => {
                    tracing::debug!(
                        conversation_id = %self.conversation_id,
                        "salvaging unterminated final record"
                    );
                    if let Err(source) = self.renderer.apply(&classify(record)) {
                        let conversation_id = self.conversation_id;
                        return self.finish_failed(SessionError::SinkDetached {
                            stage: "session-flush",
                            conversation_id,
                            source,
                        });
                    }
                }
                None => tracing::debug!(
                    conversation_id = %self.conversation_id,
                    line_len = line.len(),
                    "discarding unterminated trailing line"
                ),
            }
        }

        self.transition(SessionState::Completed);
        tracing::info!(
            conversation_id = %self.conversation_id,
            body_len = self.renderer.snapshot().accumulated_text.len(),
            "response stream completed"
        );
        self.resolve(SessionOutcome::Completed);
    }

    fn finish_failed(mut self, error: SessionError) {
        // Partial body stays; only the status line changes.
        if let Err(detached) = self
            .renderer
            .write_terminal_status(&self.options.failure_status)
        {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                error = %detached,
                "failure status not rendered"
            );
        }

        self.transition(SessionState::Failed);
        tracing::error!(
            conversation_id = %self.conversation_id,
            error = %error,
            "response stream failed"
        );
        self.resolve(SessionOutcome::Failed(error));
    }

    fn finish_cancelled(mut self, stream: Option<ChunkStream>) {
        if let Some(stream) = stream {
            stream.abort();
        }

        self.transition(SessionState::Cancelled);
        tracing::info!(conversation_id = %self.conversation_id, "response stream cancelled");
        self.resolve(SessionOutcome::Cancelled);
    }

    fn transition(&self, next: SessionState) {
        self.state_tx.send_if_modified(|state| match state.advance(next) {
            Ok(advanced) => {
                *state = advanced;
                true
            }
            Err(rejected) => {
                tracing::error!(
                    conversation_id = %self.conversation_id,
                    from = ?rejected.from,
                    to = ?rejected.to,
                    "illegal session transition ignored"
                );
                false
            }
        });
    }

    fn resolve(&mut self, outcome: SessionOutcome) {
        if let Some(outcome_tx) = self.outcome_tx.take() {
            let _ = outcome_tx.send(outcome);
        }
    }
}

async fn read_step(stream: &mut ChunkStream, idle_timeout: Option<Duration>) -> ReadStep {
    let next = match idle_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, stream.next_chunk()).await {
            Ok(next) => next,
            Err(_) => return ReadStep::Idle(timeout),
        },
        None => stream.next_chunk().await,
    };

    match next {
        Some(Ok(chunk)) => ReadStep::Chunk(chunk),
        Some(Err(error)) => ReadStep::Failed(error),
        None => ReadStep::End,
    }
}

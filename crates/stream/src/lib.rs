#![deny(unsafe_code)]

//! Incremental decoder for chat response streams.
//!
//! Bytes from a long-lived response flow through [`FrameSplitter`] into lines,
//! [`extract_record`] keeps `data:` payloads, [`classify`] turns each payload into a
//! [`StreamEvent`], and an [`IncrementalRenderer`] applies the events to a
//! [`RenderSink`]. [`StreamSession`] drives that pipeline for one submitted message.

pub mod error;
pub mod event;
pub mod frame;
pub mod ids;
pub mod record;
pub mod render;
pub mod session;
pub mod transport;

pub use error::{SessionError, SessionResult, TransportError};
pub use event::{EventKind, StreamEvent, classify};
pub use frame::{DEFAULT_MAX_LINE_LEN, FrameSplitter, LineTooLong};
pub use ids::ConversationId;
pub use record::{DATA_PREFIX, Record, extract_record};
pub use render::{DetachedSink, IncrementalRenderer, RenderSink, SinkHandle};
pub use session::{
    CancelHandle, Completion, DEFAULT_FAILURE_STATUS, IllegalTransition, SessionHandle,
    SessionOptions, SessionOutcome, SessionState, SessionWorker, StreamSession,
};
pub use transport::{BoxChunkStream, BoxFuture, ChatTransport, ChunkStream};

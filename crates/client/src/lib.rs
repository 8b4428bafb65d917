#![deny(unsafe_code)]

//! HTTP bindings for the chat backend: the streaming [`HttpTransport`] that feeds
//! a `murmur_stream::StreamSession`, and [`ChatApi`] for the plain REST calls.

pub mod api;
pub mod config;
pub mod error;
pub mod transport;
pub mod types;

pub use api::{ChatApi, validate_title};
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::{ClientError, ClientResult};
pub use transport::{HttpTransport, STREAM_PATH};
pub use types::{ChatMessage, ChatSummary, MAX_TITLE_CHARS, MessageRole};

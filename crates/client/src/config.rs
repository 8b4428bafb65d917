use std::time::Duration;

use snafu::{ResultExt, ensure};

use crate::error::{BuildHttpClientSnafu, ClientResult, InvalidBaseUrlSnafu};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the chat backend lives and how long plain requests may take.
///
/// `request_timeout` applies to the REST calls only. Streaming requests are
/// bounded by the session's idle timeout instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Joins `path` onto the base url, tolerating a trailing slash on the base.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn validate(&self) -> ClientResult<()> {
        let base_url = self.base_url.trim();
        ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            InvalidBaseUrlSnafu {
                stage: "validate-base-url",
                base_url: self.base_url.clone(),
                message: "expected an http:// or https:// url",
            }
        );
        ensure!(
            base_url.len() > base_url.find("://").map_or(0, |index| index + 3),
            InvalidBaseUrlSnafu {
                stage: "validate-base-url",
                base_url: self.base_url.clone(),
                message: "missing host",
            }
        );
        Ok(())
    }

    pub(crate) fn http_client(&self) -> ClientResult<reqwest::Client> {
        self.validate()?;
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-http-client",
            })
    }
}

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("failed to build http client on `{stage}`"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("base url `{base_url}` is invalid on `{stage}`: {message}"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        message: String,
    },
    #[snafu(display("request to `{url}` failed on `{stage}`"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("`{url}` answered {status} on `{stage}`: {body}"))]
    Status {
        stage: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[snafu(display("response from `{url}` could not be decoded on `{stage}`"))]
    Decode {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("chat title is invalid on `{stage}`: {reason}"))]
    InvalidTitle {
        stage: &'static str,
        reason: &'static str,
    },
}

impl ClientError {
    /// HTTP status of a non-success answer, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

use murmur_client::ClientError;
use murmur_stream::SessionError;
use snafu::Snafu;

use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("settings could not be saved on `{stage}`"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("backend call failed on `{stage}`"))]
    Client {
        stage: &'static str,
        source: ClientError,
    },
    #[snafu(display("message could not be streamed on `{stage}`"))]
    Session {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("terminal i/o failed on `{stage}`"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("background task failed on `{stage}`"))]
    Task {
        stage: &'static str,
        source: tokio::task::JoinError,
    },
    #[snafu(display("chat {id} does not exist"))]
    UnknownChat {
        stage: &'static str,
        id: murmur_stream::ConversationId,
    },
}

pub type CommandResult<T> = Result<T, CommandError>;

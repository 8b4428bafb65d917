use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use murmur_stream::ConversationId;

#[derive(Debug, Parser)]
#[command(name = "murmur", about = "Terminal client for a streaming chat backend", version)]
pub struct Cli {
    /// Settings file to use instead of the per-user default
    #[arg(long, global = true, env = "MURMUR_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Backend url for this run only
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Log debug output of every murmur crate to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(flatten)]
    Backend(BackendCommand),
    /// Show or change stored settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Commands that talk to the chat backend.
#[derive(Debug, Subcommand)]
pub enum BackendCommand {
    /// List chats
    Chats,
    /// Create a chat
    Create {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Delete a chat after confirmation
    Delete {
        id: ConversationId,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the messages of a chat
    History { id: ConversationId },
    /// Send one message and stream the answer
    Send {
        id: ConversationId,
        /// Wait for the whole answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Interactive conversation; `/use <id>`, `/new <title>` and `/quit` are understood
    Chat { id: Option<ConversationId> },
    /// Ask the backend whether streaming is available
    Status,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Set(ConfigUpdate),
}

#[derive(Debug, Default, Args)]
pub struct ConfigUpdate {
    #[arg(long)]
    pub base_url: Option<String>,
    #[arg(long)]
    pub connect_timeout_secs: Option<u64>,
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
    /// Zero disables the idle timeout
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
    #[arg(long)]
    pub failure_status: Option<String>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.connect_timeout_secs.is_none()
            && self.request_timeout_secs.is_none()
            && self.idle_timeout_secs.is_none()
            && self.failure_status.is_none()
    }
}

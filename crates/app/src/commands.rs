use std::io::{self, Write};
use std::sync::Arc;

use murmur_client::{ChatApi, ChatMessage, ChatSummary};
use murmur_stream::{ConversationId, SessionHandle, SessionOutcome, StreamSession};
use snafu::{Report, ResultExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::{BackendCommand, Cli, Command, ConfigCommand, ConfigUpdate};
use crate::error::{
    ClientSnafu, CommandResult, SessionSnafu, SettingsSnafu, TaskSnafu, TerminalSnafu,
    UnknownChatSnafu,
};
use crate::settings::{ClientSettings, SettingsStore};
use crate::terminal::{self, TerminalPrinter};

pub async fn run(cli: Cli) -> CommandResult<()> {
    let store = match cli.settings {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };

    match cli.command {
        Command::Config(command) => config(&store, command),
        Command::Backend(command) => backend(&store, cli.base_url.as_deref(), command).await,
    }
}

async fn backend(
    store: &SettingsStore,
    base_url: Option<&str>,
    command: BackendCommand,
) -> CommandResult<()> {
    if let Some(base_url) = base_url {
        store.override_base_url(base_url);
    }

    let settings = store.settings();
    debug!(base_url = %settings.base_url, "using backend");
    let api = ChatApi::new(settings.client_config()).context(ClientSnafu {
        stage: "build-client",
    })?;

    match command {
        BackendCommand::Chats => list_chats(&api).await,
        BackendCommand::Create { title } => create_chat(&api, &title.join(" ")).await,
        BackendCommand::Delete { id, yes } => delete_chat(&api, id, yes).await,
        BackendCommand::History { id } => history(&api, id).await,
        BackendCommand::Send {
            id,
            no_stream: true,
            text,
        } => send_whole(&api, id, &text.join(" ")).await,
        BackendCommand::Send { id, text, .. } => {
            send(&api, &settings, id, &text.join(" ")).await
        }
        BackendCommand::Chat { id } => chat(&api, &settings, id).await,
        BackendCommand::Status => status(&api).await,
    }
}

async fn list_chats(api: &ChatApi) -> CommandResult<()> {
    let chats = api.list_chats().await.context(ClientSnafu {
        stage: "list-chats",
    })?;

    let mut out = io::stdout().lock();
    if chats.is_empty() {
        writeln!(out, "no chats yet").context(TerminalSnafu {
            stage: "print-chats",
        })?;
    }
    for chat in &chats {
        writeln!(out, "{}", chat_line(chat)).context(TerminalSnafu {
            stage: "print-chats",
        })?;
    }
    Ok(())
}

async fn create_chat(api: &ChatApi, title: &str) -> CommandResult<()> {
    let chat = api.create_chat(title).await.context(ClientSnafu {
        stage: "create-chat",
    })?;
    writeln!(io::stdout(), "{}", chat_line(&chat)).context(TerminalSnafu {
        stage: "print-created-chat",
    })
}

async fn delete_chat(api: &ChatApi, id: ConversationId, yes: bool) -> CommandResult<()> {
    let chat = api
        .get_chat(id)
        .await
        .context(ClientSnafu { stage: "find-chat" })?
        .ok_or_else(|| {
            UnknownChatSnafu {
                stage: "delete-chat",
                id,
            }
            .build()
        })?;

    if !yes {
        let prompt = format!("delete chat {} \"{}\"? [y/N] ", chat.id, chat.title);
        if !confirm(&prompt).await? {
            eprintln!("kept chat {}", chat.id);
            return Ok(());
        }
    }

    let deleted = api.delete_chat(id).await.context(ClientSnafu {
        stage: "delete-chat",
    })?;
    if !deleted {
        return UnknownChatSnafu {
            stage: "delete-chat",
            id,
        }
        .fail();
    }
    eprintln!("deleted chat {id}");
    Ok(())
}

async fn history(api: &ChatApi, id: ConversationId) -> CommandResult<()> {
    let messages = api.list_messages(id).await.context(ClientSnafu {
        stage: "list-messages",
    })?;

    let mut out = io::stdout().lock();
    for message in &messages {
        writeln!(out, "{}", message_line(message)).context(TerminalSnafu {
            stage: "print-history",
        })?;
    }
    Ok(())
}

async fn send(
    api: &ChatApi,
    settings: &ClientSettings,
    id: ConversationId,
    text: &str,
) -> CommandResult<()> {
    match stream_answer(api, settings, Some(id), text).await? {
        SessionOutcome::Completed => Ok(()),
        SessionOutcome::Cancelled => {
            eprintln!("[cancelled]");
            Ok(())
        }
        SessionOutcome::Failed(error) => Err(error).context(SessionSnafu {
            stage: "stream-answer",
        }),
    }
}

async fn send_whole(api: &ChatApi, id: ConversationId, text: &str) -> CommandResult<()> {
    let reply = api.send_message(id, text).await.context(ClientSnafu {
        stage: "send-message",
    })?;
    writeln!(io::stdout(), "{}", reply.content).context(TerminalSnafu {
        stage: "print-reply",
    })
}

async fn status(api: &ChatApi) -> CommandResult<()> {
    let status = api.stream_status().await.context(ClientSnafu {
        stage: "stream-status",
    })?;
    writeln!(io::stdout(), "{}", status.trim()).context(TerminalSnafu {
        stage: "print-status",
    })
}

fn config(store: &SettingsStore, command: ConfigCommand) -> CommandResult<()> {
    match command {
        ConfigCommand::Show => {
            let settings = store.settings();
            let rendered = serde_json::to_string_pretty(settings.as_ref())
                .unwrap_or_else(|_| format!("{settings:?}"));
            let mut out = io::stdout().lock();
            writeln!(out, "# {}", store.config_path().display())
                .and_then(|()| writeln!(out, "{rendered}"))
                .context(TerminalSnafu {
                    stage: "print-settings",
                })
        }
        ConfigCommand::Set(update) => {
            if update.is_empty() {
                eprintln!("nothing to change");
                return Ok(());
            }
            let settings = apply_update(&store.file_settings(), update);
            store.update(settings).context(SettingsSnafu {
                stage: "update-settings",
            })?;
            info!(path = %store.config_path().display(), "settings updated");
            Ok(())
        }
    }
}

fn apply_update(current: &ClientSettings, update: ConfigUpdate) -> ClientSettings {
    let mut settings = current.clone();
    if let Some(base_url) = update.base_url {
        settings.base_url = base_url;
    }
    if let Some(secs) = update.connect_timeout_secs {
        settings.connect_timeout_secs = secs;
    }
    if let Some(secs) = update.request_timeout_secs {
        settings.request_timeout_secs = secs;
    }
    if let Some(secs) = update.idle_timeout_secs {
        settings.idle_timeout_secs = secs;
    }
    if let Some(failure_status) = update.failure_status {
        settings.failure_status = failure_status;
    }
    settings.normalized()
}

/// Streams one answer to the terminal; Ctrl-C cancels it.
async fn stream_answer(
    api: &ChatApi,
    settings: &ClientSettings,
    chat_id: Option<ConversationId>,
    text: &str,
) -> CommandResult<SessionOutcome> {
    let session = StreamSession::new(Arc::new(api.transport()), chat_id)
        .with_options(settings.session_options());
    let SessionHandle {
        conversation_id,
        sink,
        completion,
        mut cancel,
        worker,
        ..
    } = session.start(text).context(SessionSnafu {
        stage: "start-session",
    })?;

    let worker = tokio::spawn(worker);
    let printer = tokio::spawn(terminal::follow(sink, TerminalPrinter::stdio()));

    let completion = completion.wait();
    tokio::pin!(completion);
    let outcome = tokio::select! {
        outcome = &mut completion => outcome,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!(%conversation_id, "cancelling answer");
                    cancel.cancel();
                }
                Err(error) => warn!(%error, "ctrl-c handler unavailable"),
            }
            completion.await
        }
    };

    worker.await.context(TaskSnafu {
        stage: "join-session-worker",
    })?;
    printer
        .await
        .context(TaskSnafu {
            stage: "join-terminal-printer",
        })?
        .context(TerminalSnafu {
            stage: "print-answer",
        })?;
    drop(cancel);

    debug!(%conversation_id, state = ?outcome.state(), "answer finished");
    Ok(outcome)
}

async fn chat(
    api: &ChatApi,
    settings: &ClientSettings,
    id: Option<ConversationId>,
) -> CommandResult<()> {
    let mut bound = match id {
        Some(id) => {
            let chat = api
                .get_chat(id)
                .await
                .context(ClientSnafu { stage: "find-chat" })?
                .ok_or_else(|| UnknownChatSnafu { stage: "chat", id }.build())?;
            eprintln!("using chat {} ({})", chat.id, chat.title);
            Some(chat.id)
        }
        None => {
            eprintln!("no chat bound; use /use <id> or /new <title>");
            None
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt(bound)?;
        let line = tokio::select! {
            line = lines.next_line() => line.context(TerminalSnafu { stage: "read-chat-line" })?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Invalid(message) => eprintln!("{message}"),
            ChatInput::Use(id) => match api.get_chat(id).await {
                Ok(Some(chat)) => {
                    eprintln!("using chat {} ({})", chat.id, chat.title);
                    bound = Some(chat.id);
                }
                Ok(None) => eprintln!("chat {id} does not exist"),
                Err(error) => eprintln!("{}", Report::from_error(error)),
            },
            ChatInput::New(title) => match api.create_chat(&title).await {
                Ok(chat) => {
                    eprintln!("created chat {} ({})", chat.id, chat.title);
                    bound = Some(chat.id);
                }
                Err(error) => eprintln!("{}", Report::from_error(error)),
            },
            ChatInput::Message(text) => match stream_answer(api, settings, bound, &text).await {
                Ok(SessionOutcome::Completed) => {}
                Ok(SessionOutcome::Cancelled) => eprintln!("[cancelled]"),
                Ok(SessionOutcome::Failed(error)) => eprintln!("{}", Report::from_error(error)),
                Err(error) => eprintln!("{}", Report::from_error(error)),
            },
        }
    }
    Ok(())
}

fn print_prompt(bound: Option<ConversationId>) -> CommandResult<()> {
    let mut out = io::stdout().lock();
    let written = match bound {
        Some(id) => write!(out, "murmur[{id}]> "),
        None => write!(out, "murmur> "),
    };
    written.and_then(|()| out.flush()).context(TerminalSnafu {
        stage: "print-prompt",
    })
}

async fn confirm(prompt: &str) -> CommandResult<bool> {
    eprint!("{prompt}");
    io::stderr().flush().context(TerminalSnafu {
        stage: "print-confirmation",
    })?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await
        .context(TerminalSnafu {
            stage: "read-confirmation",
        })?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Empty,
    Quit,
    Use(ConversationId),
    New(String),
    Message(String),
    Invalid(String),
}

fn parse_line(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Message(line.to_string());
    };

    let (name, argument) = command
        .split_once(char::is_whitespace)
        .map(|(name, argument)| (name, argument.trim()))
        .unwrap_or((command, ""));
    match name {
        "quit" | "exit" => ChatInput::Quit,
        "use" => argument
            .parse()
            .map(ChatInput::Use)
            .unwrap_or_else(|_| ChatInput::Invalid(format!("`{argument}` is not a chat id"))),
        "new" if !argument.is_empty() => ChatInput::New(argument.to_string()),
        "new" => ChatInput::Invalid("usage: /new <title>".to_string()),
        _ => ChatInput::Invalid(format!("unknown command /{name}")),
    }
}

fn chat_line(chat: &ChatSummary) -> String {
    format!(
        "{:>6}  {}  ({} messages{})",
        chat.id.get(),
        chat.title,
        chat.message_count(),
        chat.created_at
            .as_deref()
            .map(|created_at| format!(", created {created_at}"))
            .unwrap_or_default()
    )
}

fn message_line(message: &ChatMessage) -> String {
    format!("[{}] {}", message.role, message.content)
}

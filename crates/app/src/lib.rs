#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod settings;
pub mod terminal;

pub use cli::Cli;
pub use error::{CommandError, CommandResult};
pub use settings::{ClientSettings, SettingsError, SettingsStore};

use crate::config::StorageKind;
use crate::core::models::Mode;
use crate::preferences::{Language, Theme};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "chatkeep")]
#[command(author, version, about = "Client-held conversation store with an optimistic send pipeline", long_about = None)]
pub struct Cli {
    /// Override the configured storage kind
    #[arg(long, global = true, value_enum)]
    pub storage: Option<StorageArg>,

    /// Use the HTTP backend at this base URL instead of the configured one
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StorageArg {
    Durable,
    Sqlite,
    Session,
    Memory,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Durable => StorageKind::Durable,
            StorageArg::Sqlite => StorageKind::Sqlite,
            StorageArg::Session => StorageKind::Session,
            StorageArg::Memory => StorageKind::Memory,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session
    Interactive {
        /// Mode used for every message sent in this session
        #[arg(short, long, default_value = "normal")]
        mode: Mode,
    },

    /// Send a single message and print the reply
    Send {
        message: String,

        /// Target conversation (default: the current one)
        #[arg(short, long)]
        conversation: Option<String>,

        #[arg(short, long, default_value = "normal")]
        mode: Mode,
    },

    /// List conversations, most recent first
    List,

    /// Print every message of a conversation
    Show {
        /// Conversation id (default: the current one)
        id: Option<String>,
    },

    /// Create an empty conversation and select it
    New {
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Delete a conversation
    Delete { id: String },

    /// Show or change UI preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },

    /// Remove everything this client has persisted
    Reset,
}

#[derive(Subcommand)]
pub enum PrefsAction {
    Theme {
        #[arg(value_enum)]
        theme: ThemeArg,
    },
    Language {
        #[arg(value_enum)]
        language: LanguageArg,
    },
    Sidebar {
        #[arg(action = clap::ArgAction::Set)]
        open: bool,
    },
    /// Recompute the mobile flag for a viewport width
    Resize { width: u32 },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LanguageArg {
    En,
    He,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Self {
        match arg {
            LanguageArg::En => Language::En,
            LanguageArg::He => Language::He,
        }
    }
}

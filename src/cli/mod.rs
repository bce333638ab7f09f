mod commands;

pub use commands::{Cli, Commands, LanguageArg, PrefsAction, StorageArg, ThemeArg};

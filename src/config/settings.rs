use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits enforced (or exposed) by the conversation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum message length in code points, measured after trimming
    pub max_message_length: usize,
    /// Exposed to collaborators, not enforced by the store
    pub max_messages_per_conversation: usize,
    pub max_conversations: usize,
    pub placeholder_title: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            max_messages_per_conversation: 1000,
            max_conversations: 50,
            placeholder_title: "New Conversation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// JSON files in a directory, survives restarts
    Durable,
    /// Single SQLite file, survives restarts
    Sqlite,
    /// Scratch directory removed when the process lets go of it
    Session,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Durable,
            path: PathBuf::from("./chatkeep-data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Mock,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Mock,
            base_url: "http://localhost:8000/api".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Viewports narrower than this are treated as mobile
    pub mobile_breakpoint_px: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            mobile_breakpoint_px: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub channel_buffer_size: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject limits the store cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_conversations == 0 {
            return Err(ConfigError::Message(
                "engine.max_conversations must be at least 1".to_string(),
            ));
        }
        if self.engine.max_message_length == 0 {
            return Err(ConfigError::Message(
                "engine.max_message_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings suited to tests and throwaway runs: in-memory storage, mock backend
    pub fn ephemeral() -> Self {
        Self {
            storage: StorageConfig {
                kind: StorageKind::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let settings = Settings::default();
        assert_eq!(settings.engine.max_message_length, 4000);
        assert_eq!(settings.engine.max_messages_per_conversation, 1000);
        assert_eq!(settings.engine.max_conversations, 50);
        assert_eq!(settings.engine.placeholder_title, "New Conversation");
        assert_eq!(settings.ui.mobile_breakpoint_px, 768);
        assert_eq!(settings.storage.kind, StorageKind::Durable);
        assert_eq!(settings.backend.kind, BackendKind::Mock);
    }

    #[test]
    fn test_partial_sections_fall_back_to_defaults() {
        let config = Config::builder()
            .add_source(File::from_str(
                "[storage]\nkind = \"sqlite\"\npath = \"/tmp/chat.db\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.storage.kind, StorageKind::Sqlite);
        assert_eq!(settings.storage.path, PathBuf::from("/tmp/chat.db"));
        assert_eq!(settings.engine.max_conversations, 50);
    }

    #[test]
    fn test_zero_conversation_cap_is_rejected() {
        let config = Config::builder()
            .add_source(File::from_str(
                "[engine]\nmax_message_length = 4000\nmax_messages_per_conversation = 1000\nmax_conversations = 0\nplaceholder_title = \"Chat\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_conversations"));
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_ephemeral_uses_memory_storage() {
        let settings = Settings::ephemeral();
        assert_eq!(settings.storage.kind, StorageKind::Memory);
        assert_eq!(settings.backend.kind, BackendKind::Mock);
    }
}

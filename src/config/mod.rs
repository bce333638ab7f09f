mod settings;

pub use settings::{
    BackendConfig, BackendKind, EngineConfig, LoggingConfig, Settings, StorageConfig, StorageKind,
    SystemConfig, UiConfig,
};
